pub mod ranker;

pub use ranker::{rank, recommend, RankerInputs};
