//! Build script for pco-sys.
//!
//! The bindings in `src/lib.rs` are hand-maintained against `SC2_CamExport.h`
//! and `SC2_SDKStructures.h`, so the script only emits link directives. With
//! the `pco-sdk` feature disabled nothing is linked and the crate compiles on
//! any host.

fn main() {
    println!("cargo:rerun-if-env-changed=PCO_SDK_DIR");
    println!("cargo:rerun-if-env-changed=PCO_LIB_DIR");

    #[cfg(feature = "pco-sdk")]
    link_sdk();
}

#[cfg(feature = "pco-sdk")]
fn link_sdk() {
    use std::env;
    use std::path::PathBuf;

    // PCO_LIB_DIR overrides the default <sdk>/lib64 layout
    let lib_dir = match env::var("PCO_LIB_DIR") {
        Ok(dir) => Some(PathBuf::from(dir)),
        Err(_) => env::var("PCO_SDK_DIR")
            .ok()
            .map(|sdk| PathBuf::from(sdk).join("lib64")),
    };

    match lib_dir {
        Some(dir) if dir.exists() => {
            println!("cargo:rustc-link-search=native={}", dir.display());
        }
        Some(dir) => {
            println!(
                "cargo:warning=PCO SDK lib path does not exist: {}",
                dir.display()
            );
        }
        None => {
            println!("cargo:warning=PCO_SDK_DIR not set; relying on the system library path");
        }
    }

    println!("cargo:rustc-link-lib=dylib=SC2_Cam");
}
