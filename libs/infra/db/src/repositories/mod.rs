pub mod account_repo;
pub mod bundle_repo;
pub mod whitelist_repo;

pub use account_repo::AccountReadRepository;
pub use bundle_repo::BundleReadRepository;
pub use whitelist_repo::WhitelistReadRepository;
