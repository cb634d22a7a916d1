use std::sync::Arc;

pub trait ArcExt {
    #[must_use]
    fn clone_arc(&self) -> Self;
}

impl<T: ?Sized> ArcExt for Arc<T> {
    fn clone_arc(&self) -> Self {
        Self::clone(self)
    }
}
