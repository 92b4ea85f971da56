pub mod logging;
pub mod normalize;
pub mod text;
