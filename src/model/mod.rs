//! Neural pitch models run through candle.

pub mod crepe;
