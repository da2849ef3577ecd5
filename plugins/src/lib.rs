pub mod cloud;
pub mod dataplane;
pub mod factory;
pub mod services;

pub use services::CloudServicesFactory;
