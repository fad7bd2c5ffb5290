pub mod action;
pub mod job;
pub mod outcome;
pub mod states;
pub mod unit;
