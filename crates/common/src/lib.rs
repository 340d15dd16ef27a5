// fuzzy-common: shared types and utilities for the fuzzy note daemon

pub mod document;
pub mod path;
pub mod protocol;
