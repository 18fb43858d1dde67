#[macro_use]
extern crate lazy_static;

pub mod cfg;
pub mod ir;
pub mod lexer;
pub mod parser;



#[cfg(test)]
mod cfg_tests;
