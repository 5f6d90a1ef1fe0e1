//! Domain types shared by every pipeline component.
//!
//! Record kinds use closed, tagged enums for status fields rather than
//! open string maps: a reader rejects a record whose `version` it
//! doesn't recognize instead of guessing at a shape.

pub mod chunk;
pub mod corpus;
pub mod fragment;
pub mod location;
pub mod numerals;
pub mod records;

pub use chunk::Chunk;
pub use corpus::{CorpusId, CorpusMeta};
pub use fragment::{Fragment, FragmentRef};
pub use location::{Location, Section};
pub use records::{
    AlignmentMode, AlignmentRecord, AlignmentStatus, CanonicalGuideRecord, CanonicalStatus,
    ChunkRecord, ExplanationRecord, ParagraphAlignment,
};
