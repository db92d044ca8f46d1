//! API request/response models.

pub mod common;
pub mod device;
pub mod error;

pub use common::{ApiResponse, ResponseMeta};
pub use device::DeviceDto;
pub use error::ErrorResponse;
