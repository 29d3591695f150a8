pub mod api;
pub mod photos;

pub use api::AgendaClient;
pub use photos::{PhotoGateway, UploadSource};
