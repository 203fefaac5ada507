//! Core types for the Seam voxel-field memory system.
//!
//! This crate defines the vocabulary shared between the narrow-band block
//! pool (`seam-pool`) and its external collaborators: the spatial zone
//! manager that annotates blocks with positions, and the material/type
//! registries whose IDs the pool treats as opaque tags.
//!
//! Nothing in here allocates or locks; it is pure data plus lookup tables.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod id;
pub mod pattern;
pub mod tier;
pub mod vec3;

pub use id::{MaterialId, OwnerTag, RequesterId};
pub use pattern::AccessPattern;
pub use tier::{PrecisionTier, SimdClass};
pub use vec3::Vec3;
