pub mod ultraman;
pub mod x_api;
pub mod youtube;
