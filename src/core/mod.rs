pub mod contact;
pub mod draft;
pub mod validate;
