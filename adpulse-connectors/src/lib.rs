pub mod dropi;
pub mod error;
pub mod lucidbot;
pub mod meta;
pub mod paginate;

pub use dropi::{DropiClient, DropiCredentials};
pub use error::FetchError;
pub use lucidbot::{ContactKind, LucidbotClient};
pub use meta::{AdInsight, MetaClient};
pub use paginate::{fetch_all, PageSource};
