//! Catalog records and the gateway that guards them.

mod dedup;
mod gateway;
mod species;
mod types;

pub use dedup::{deduplicate, partition_duplicates};
pub use gateway::{
    CatalogGateway, ExternalOpener, SystemOpener, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_TITLE,
};
pub use species::{
    group_by_family, load_species, parse_species, ConservationStatus, SpeciesError,
    SpeciesProfile, DEFAULT_FAMILY,
};
pub use types::{Collection, ContentRecord, FileUpload, PageMetadata, RecordDraft};
