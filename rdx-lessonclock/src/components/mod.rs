//! The building blocks of the lesson timer.

pub mod behavior;
pub mod controller;
pub mod finalizer;
pub mod scheduler;
pub mod storage;
