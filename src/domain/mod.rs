// Domain layer - Core types and rules

pub mod model;
pub mod rules;
