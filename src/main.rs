use crate::cli::run;

pub mod cli;
mod config;
pub mod domain;
pub mod index;
pub mod search;
pub mod storage;
pub mod tags;

#[cfg(test)]
pub mod testutil;

fn main() {
    run();
}
