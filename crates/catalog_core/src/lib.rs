pub mod asset;
pub mod credential;
pub mod error;
pub mod fetcher;
pub mod format;
pub mod location;
pub mod table;
pub mod traits;
pub mod version;

pub mod prelude {
    pub use super::asset::*;
    pub use super::credential::*;
    pub use super::error::*;
    pub use super::fetcher::*;
    pub use super::format::*;
    pub use super::location::*;
    pub use super::table::*;
    pub use super::traits::*;
    pub use super::version::*;
}
