//! Core engine: margin estimation and the payout controller loop.

pub mod bias;
pub mod controller;
pub mod margin;
pub mod scheduler;
