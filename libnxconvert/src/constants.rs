/// Attribute carrying the NeXus class of a group
pub const NX_CLASS_ATTR: &str = "NX_class";
/// Class written to the file root
pub const NX_ROOT_CLASS: &str = "NXroot";
/// Terminates an `extends` chain
pub const NX_OBJECT_CLASS: &str = "NXobject";
/// Placeholder of the top level measurement group
pub const ENTRY_PLACEHOLDER: &str = "ENTRY";
/// Instance name used when nothing else is known about the entries
pub const DEFAULT_ENTRY_NAME: &str = "entry";
/// Name of the attribute holding the unit of a field
pub const UNITS_ATTR: &str = "units";
/// Attribute naming the default child to plot
pub const DEFAULT_ATTR: &str = "default";
/// Unit category that never needs a unit attribute
pub const NX_UNITLESS: &str = "NX_UNITLESS";

/// Sub-directories of a definitions root, in search order
pub const DEFINITION_DIRECTORIES: [&str; 3] =
    ["applications", "base_classes", "contributed_definitions"];
/// File suffix of NXDL documents
pub const NXDL_SUFFIX: &str = ".nxdl.xml";

/// Default deflate level for compressed datasets
pub const DEFAULT_COMPRESSION_LEVEL: u8 = 4;
/// Upper bound on the number of bytes in one chunk of a compressed dataset
pub const MAX_CHUNK_BYTES: usize = 1 << 20;

/// Version of the output layout, written into the creator attribute
pub const FORMAT_VERSION: &str = "1.0";
