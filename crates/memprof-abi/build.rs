fn main() {
    println!("cargo:rerun-if-changed=version_scripts/memprof.map");
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("linux") {
        return;
    }
    // The heap entry points are only exported without debug assertions; a
    // script naming them would fail to link under --no-undefined-version.
    if std::env::var_os("CARGO_CFG_DEBUG_ASSERTIONS").is_some() {
        return;
    }
    let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") else {
        return;
    };
    let version_script = format!("{manifest_dir}/version_scripts/memprof.map");
    if std::path::Path::new(&version_script).exists() {
        println!("cargo:rustc-cdylib-link-arg=-Wl,--version-script={version_script}");
    }
}
