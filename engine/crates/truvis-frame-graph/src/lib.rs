#[macro_use]
mod profiling;

pub mod frame_graph;
