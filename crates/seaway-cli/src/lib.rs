//! Input and output formats shared by the `seaway` binary and the
//! visualizer.
pub mod io;
