//! Generated protobuf definitions for the language runtime contract.
//!
//! Provides the message types plus client and server stubs for the
//! `pulumirpc.LanguageRuntime` service:
//! - `GetRequiredPlugins`: static plugin discovery for a program
//! - `Run`: execute a program against a resource monitor
//! - `GetPluginInfo`: version of the language host itself

#[allow(non_camel_case_types)]
#[allow(clippy::derive_partial_eq_without_eq)]
pub mod language_pb {
    tonic::include_proto!("pulumirpc");
}

pub mod descriptor {
    pub const LANGUAGE_FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("language_descriptor");
}
