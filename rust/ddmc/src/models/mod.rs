pub mod array;
pub mod motif;
pub mod partition;
pub mod peptides;

pub use array::Array2D;
pub use motif::{
    Motif,
    PsiteCounts,
    PsiteType,
};
pub use partition::{
    MembershipSnapshot,
    Partition,
};
pub use peptides::PeptideSet;
