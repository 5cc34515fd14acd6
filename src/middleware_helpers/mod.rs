pub mod request_id;
pub mod timeout;

pub use request_id::{request_id_middleware, REQUEST_ID_HEADER};
pub use timeout::timeout_envelope_middleware;
