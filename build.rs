//! Build script for cardboard_vr
//! Adds linker flags for the Cardboard SDK and GL ES

fn main() {
    // Only for Android targets
    if std::env::var("CARGO_CFG_TARGET_OS").map_or(false, |os| os == "android") {
        // libcardboard_api.so from the Cardboard SDK
        println!("cargo:rustc-link-lib=cardboard_api");
        println!("cargo:rustc-link-lib=GLESv2");
        if let Ok(dir) = std::env::var("CARDBOARD_LIB_DIR") {
            println!("cargo:rustc-link-search=native={}", dir);
        }
        println!("cargo:rerun-if-env-changed=CARDBOARD_LIB_DIR");
    }
}
