pub mod price;
pub mod request;
pub mod response;
pub mod settings;
