//! # Hook
//!
//! This module covers hooks, which redirect execution from one function to another,
//! and the process-wide table that keeps them alive until they are reverted

pub mod jmphook;
pub mod table;
