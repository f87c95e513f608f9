pub mod compiler;
pub mod graph;
pub mod heightmap;
pub mod interpreter;
pub mod noise;
pub mod pipeline;
pub mod preset;
pub mod terrace;
pub mod vecmath;
