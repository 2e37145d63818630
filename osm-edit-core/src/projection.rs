//! Projection capability injected into geometry-sensitive actions.

use geo::Coord;

/// Maps geographic coordinates to a planar space and back.
///
/// Implementations are supplied by the caller; actions only require that
/// `invert(project(loc))` returns `loc`.
pub trait Projection {
    /// Geographic `loc` to planar point.
    fn project(&self, loc: Coord<f64>) -> Coord<f64>;

    /// Planar point back to geographic coordinates.
    fn invert(&self, point: Coord<f64>) -> Coord<f64>;
}

impl<P: Projection + ?Sized> Projection for &P {
    fn project(&self, loc: Coord<f64>) -> Coord<f64> {
        (**self).project(loc)
    }

    fn invert(&self, point: Coord<f64>) -> Coord<f64> {
        (**self).invert(point)
    }
}

impl<P: Projection + ?Sized> Projection for std::rc::Rc<P> {
    fn project(&self, loc: Coord<f64>) -> Coord<f64> {
        (**self).project(loc)
    }

    fn invert(&self, point: Coord<f64>) -> Coord<f64> {
        (**self).invert(point)
    }
}
