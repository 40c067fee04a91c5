use std::env;
use std::fs;
use std::path::PathBuf;

/// Put the linker script somewhere the linker can find it.
fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap_or_default());
    fs::write(out_dir.join("link.x"), include_bytes!("link.x")).ok();

    if env::var("CARGO_CFG_TARGET_ARCH").as_deref() == Ok("riscv64") {
        println!("cargo:rustc-link-search={}", out_dir.display());
        println!("cargo:rustc-link-arg=-Tlink.x");
    }

    println!("cargo:rerun-if-changed=link.x");
    println!("cargo:rerun-if-changed=src/entry.S");
    println!("cargo:rerun-if-changed=build.rs");
}
