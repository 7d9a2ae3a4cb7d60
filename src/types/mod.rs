pub mod trading;
pub mod candle;
pub mod prediction;

pub use trading::*;
pub use candle::*;
pub use prediction::*;
