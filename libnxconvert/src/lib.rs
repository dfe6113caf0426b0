//! # nxconvert
//!
//! nxconvert turns experiment data into NeXus files, written in Rust. It takes
//! measurement files (HDF5), electronic lab notebook exports (YAML) and a mapping config
//! (JSON), fills the template of a NeXus application definition with them, validates the
//! result against the definition and writes a single HDF5 file in the NeXus layout.
//!
//! ## Installation
//!
//! Currently the only method of install is from source, which is laid out below.
//!
//! ### Rust
//!
//! If you have not used Rust before, you will most likely need to install the Rust tool
//! chain. See the [Rust docs](https://www.rust-lang.org/tools/install) for installation
//! instructions.
//!
//! ### HDF5
//!
//! Before building and running nxconvert, HDF5 must be installed. Typically this will
//! be installed using a package manager (homebrew, apt, etc), and the Rust libraries will
//! auto detect the location of the HDF install. If HDF5 lives somewhere custom, write the
//! following snippet into the file `.cargo/config.toml` in the nxconvert repository:
//!
//! ```toml
//! [env]
//! HDF5_DIR="/path/to/my/hdf5/install/"
//!
//! [build]
//! rustflags="-C link-args=-Wl,-rpath,/path/to/my/hdf5/install/lib"
//! ```
//!
//! Virtual datasets need HDF5 1.10 or newer.
//!
//! ### Building & Install
//!
//! To build and install the CLI use `cargo install --path ./nxconvert_cli` from the top
//! level repository. The binary is called `nxconvert`.
//!
//! ### NeXus definitions
//!
//! Application definitions are read from a checkout of the NeXus definitions repository.
//! A definition named `NXfoo` is searched for as `NXfoo.nxdl.xml` under `applications/`,
//! then `base_classes/`, then `contributed_definitions/`.
//!
//! ## Parameters
//!
//! A conversion is described by a YAML params file; `nxconvert new -p params.yaml` writes
//! a template. Fields that are left out take their default:
//!
//! ```yml
//! input_files: [eln.yaml, scan.h5]
//! reader: multi
//! nxdl: NXmpes
//! output: output.nxs
//! definitions_path: definitions
//! config_file: config.json
//! entry_names: []
//! overwrite_keys: true
//! permissive: false
//! skip_units: [on/off]
//! compression_level: 4
//! ```
//!
//! When `nxdl` is `null` the definition named by the `definition` key of an ELN file is
//! used. With `permissive: true` validation errors are reported as warnings and the file
//! is written anyway.
//!
//! ### Mapping config
//!
//! The config is a JSON object from template paths to expressions:
//!
//! - `@data:/path` reads a dataset of an input file
//! - `@attrs:/path/name` reads an attribute
//! - `@eln:/path` reads an ELN value
//! - `@link:/path` writes a soft link, `@link:file.h5:/path` an external one
//! - a comma separated list is tried left to right, ending in an optional literal
//! - a leading `!` removes the enclosing group when the value cannot be found
//! - a `*` in a key is expanded over the names found in the inputs
//!
//! Objects with a `link` key write links. A list of targets is concatenated into one
//! virtual dataset and a `shape` selects part of the target as a virtual slice. Objects
//! with a `compress` key write their value as a compressed dataset.
//!
//! ## Output
//!
//! nxconvert writes the NeXus file and a log file next to it. The log holds every
//! diagnostic of the conversion. In strict mode the NeXus file is only written when
//! validation reports no errors.
//!
//! ```text
//! output.nxs - NX_class, default, creator, file_name, file_time
//! |---- entry - NX_class, default
//! |    |---- definition(dset)
//! |    |---- title(dset)
//! |    |---- sample - NX_class
//! |    |---- data - NX_class, signal
//! |    |    |---- x(dset) - units
//! ```
pub mod concept_path;
pub mod constants;
pub mod default_plot;
pub mod diagnostics;
pub mod eln;
pub mod error;
pub mod expression;
pub mod hdf5_source;
pub mod hdf_writer;
pub mod mapping;
pub mod multi_format;
pub mod nested;
pub mod nxdl_loader;
pub mod params;
pub mod process;
pub mod resolver;
pub mod schema;
pub mod source;
pub mod template;
pub mod units;
pub mod validator;
pub mod value;
pub mod virtual_layout;

#[cfg(test)]
mod test_support;
