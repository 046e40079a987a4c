pub mod hash;
pub mod reconciler;

pub use reconciler::{DerivedSpec, DocumentReconciler, DocumentStore};
