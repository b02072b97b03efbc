pub mod client;
pub mod error;
pub mod query;

pub use client::HttpQueryClient;
pub use error::{ClientError, Result};
pub use query::{QueryClient, QueryOutput, ResultFormat};

#[cfg(any(test, feature = "testing"))]
pub mod testing;
