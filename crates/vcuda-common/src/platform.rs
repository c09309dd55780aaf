/// Library names to try, in order, when loading the CUDA runtime.
pub fn runtime_library_names() -> &'static [&'static str] {
    #[cfg(target_os = "windows")]
    {
        &["cudart64_12.dll", "cudart64_110.dll", "cudart64_101.dll"]
    }
    #[cfg(target_os = "linux")]
    {
        &["libcudart.so", "libcudart.so.12", "libcudart.so.11.0"]
    }
    #[cfg(not(any(target_os = "windows", target_os = "linux")))]
    {
        &[]
    }
}

/// Returns the platform name string.
pub fn platform_name() -> &'static str {
    #[cfg(target_os = "windows")]
    { "windows" }
    #[cfg(target_os = "linux")]
    { "linux" }
    #[cfg(target_os = "macos")]
    { "macos" }
    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    { "unknown" }
}
