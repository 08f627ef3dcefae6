use std::env;
use std::fs;
use std::path::Path;

fn main() {
    // Create options template if it doesn't exist
    let out_dir = env::var("OUT_DIR").unwrap_or_else(|_| "./".to_string());
    let template_path = Path::new(&out_dir).join("../../../tsdemux.template.toml");

    let template = r#"# tsdemux options template
# Copy this file to 'tsdemux.toml' next to the binary that embeds the demuxer.

# Extra PMT: pid[:program]=pid:type[,...]
# extra_pmt = "0x100:1=0x101:video=h264,0x102:pcr"

trust_pcr = true
es_id_pid = true
split_es = true
seek_percent = false

# CSA control words (16 hex digits) and descrambled packet size (4..188)
# csa_key = "0x0000000000000000"
# csa2_key = "0x0000000000000000"
csa_packet_size = 188

# auto | enabled | disabled
arib = "auto"
"#;

    let _ = fs::write(template_path, template);
    println!("cargo:rerun-if-changed=build.rs");
}
