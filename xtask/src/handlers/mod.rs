pub mod apps;
pub mod bench;
pub mod codegen;
pub mod dev;
pub mod features;
pub mod keys;
pub mod libs;
pub mod profiling;
pub mod run;
pub mod setup;
pub mod testing;
