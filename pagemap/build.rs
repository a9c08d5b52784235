fn main() {
    // Filters are extracted from `libc` filters
    #[cfg(not(any(target_os = "android", target_os = "linux", target_os = "l4re")))]
    compile_error!("Building pagemap for an unsupported platform. Only linux and android provide /proc/<pid>/pagemap")
}
