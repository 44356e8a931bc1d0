/// Module with shared code.
extern crate rust_htslib;

#[macro_use]
extern crate error_chain;

extern crate regex;

pub mod bam_utils;
pub mod regions;
