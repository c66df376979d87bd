use std::env;
use std::fs;
use std::path::Path;

fn main() {
    // Drop a config template next to the build output so users have something to copy
    let out_dir = env::var("OUT_DIR").unwrap_or_else(|_| "./".to_string());
    let template_path = Path::new(&out_dir).join("../../../demuxio.template.toml");

    let template = r#"# DEMUXIO Configuration Template
# Copy this file to 'demuxio.toml' and adjust the values

# Read-ahead window used when a protocol does not report a packet size
io_buffer_size = 32768

# Format probing sample bounds (the sample doubles from min up to max)
probe_buf_min = 2048
probe_buf_max = 131072
"#;

    let _ = fs::write(template_path, template);
    println!("cargo:rerun-if-changed=build.rs");
}
