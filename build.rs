//! Build script for Wireable.
//!
//! No code generation: the etcd v3 messages the store needs are written by
//! hand in src/store/etcd/proto.rs rather than compiled from .proto files.

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
}
