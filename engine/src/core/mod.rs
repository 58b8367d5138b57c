pub mod duplicate;
pub mod fingerprint;
pub mod image;
pub mod integrity;
pub mod reconcile;
pub mod similarity;
