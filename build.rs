// 构建脚本: 进程内解码 (feature = "ffmpeg") 在 Windows MSVC 下链接FFmpeg依赖库
use std::env;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    if env::var_os("CARGO_FEATURE_FFMPEG").is_none() {
        return;
    }
    let os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let target_env = env::var("CARGO_CFG_TARGET_ENV").unwrap_or_default();
    if os != "windows" || target_env != "msvc" {
        return;
    }

    // Intel QSV 硬件加速 / x264
    println!("cargo:rustc-link-lib=dylib=libmfx");
    println!("cargo:rustc-link-lib=dylib=libx264");

    // OLE 自动化和VFW (dshow 摄像头)
    println!("cargo:rustc-link-lib=dylib=oleaut32");
    println!("cargo:rustc-link-lib=dylib=vfw32");

    // Secure Channel (RTSPS)
    println!("cargo:rustc-link-lib=dylib=secur32");
}
