
// the writers are `impl State` blocks
mod report;
mod dot;     pub use dot::{write_dot, DotConf};
mod escaper; pub use escaper::Escaper;
