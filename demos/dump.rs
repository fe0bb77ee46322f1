//! Command-line front end: runs both engine passes against a TS file on disk and writes its
//! reports under an output directory, mirroring the reference's own `tsextract`/`tspcap` CLIs.

use mpegts_analyzer::engine::analyze_file;
use std::env;
use std::path::PathBuf;

fn main() {
    pretty_env_logger::init();
    let mut args = env::args().skip(1);
    let input_path = args
        .next()
        .expect("usage: dump <input.ts> [output_dir] [--verify-crc]");
    let mut output_root = PathBuf::from("mpegts-analyzer-out");
    let mut verify_crc = false;
    for arg in args {
        if arg == "--verify-crc" {
            verify_crc = true;
        } else {
            output_root = PathBuf::from(arg);
        }
    }

    let engine = analyze_file(&PathBuf::from(&input_path), &output_root, verify_crc)
        .expect("analysis failed");

    println!(
        "Discovered {} elementary stream(s) across {} PCR PID(s); reports written to {}",
        engine.catalog().streams.len(),
        engine.catalog().pcr_consumers.len(),
        output_root.display()
    );
}
