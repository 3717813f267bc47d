pub use catalog_core::*;

#[cfg(feature = "client")]
pub mod client {
    pub use catalog_client::*;
}

#[cfg(feature = "fs")]
pub mod fs {
    pub use catalog_fs::*;
}

#[cfg(feature = "opendal")]
pub mod opendal {
    pub use catalog_opendal::*;
}

#[cfg(feature = "mock")]
pub mod mock {
    pub use catalog_mock::*;
}

pub mod prelude {
    pub use catalog_core::prelude::*;

    #[cfg(feature = "client")]
    pub use catalog_client::{CatalogClient, ClientConfig, ReqwestFetcher};

    #[cfg(feature = "fs")]
    pub use catalog_fs::FileSystemStore;

    #[cfg(feature = "opendal")]
    pub use catalog_opendal::OpendalStore;

    #[cfg(feature = "mock")]
    pub use catalog_mock::{MemoryHttp, MemoryStore, MemoryVersions};
}
