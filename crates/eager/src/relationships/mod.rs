//! Relationships Module - association descriptors and naming conventions

pub mod association;
pub mod inference;

pub use association::{
    AssociationDescriptor, AssociationKind, AssociationOptions, ForeignKeySide, JoinTable,
    Strategy,
};
