//! Hand-pointing shopping cart: a camera feed is sampled on a timer, every object the
//! hand points at is added to the cart once, and a confident hand gesture checks out.

pub mod args;
pub mod camera;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod detector;
pub mod error;
pub mod font;
pub mod gesture;
pub mod matcher;
pub mod output;
pub mod perception;
pub mod sampler;
pub mod session;
pub mod types;
