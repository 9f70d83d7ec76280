// Cleaning and normalization: raw rows in, star schema out

pub mod clean;
pub mod dimensions;
pub mod transform;

pub use clean::{RejectReason, TransformConfig};
pub use transform::{Rejection, TransformOutput, TransformReport, Transformer};
