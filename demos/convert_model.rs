//! Convert an exported model file to the runtime format
//!
//! Usage: cargo run --example convert_model -- <input.kflat> <output.kmodel>

use prost::Message;

use kiln_converter::prelude::*;
use kiln_converter::quant::QuantConfig;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        eprintln!("Usage: convert_model <input.kflat> <output.kmodel>");
        std::process::exit(1);
    }

    let bytes = std::fs::read(&args[1])?;
    let model = FlatModel::decode(&bytes[..])?;
    println!(
        "Loaded '{}': {} operators, {} tensors (exporter: {})",
        args[1],
        model.operators.len(),
        model.tensors.len(),
        model.producer
    );

    let options = ConvertOptions {
        quant: QuantConfig {
            quant_type: QuantType::WeightQuant,
            bits: 8,
            per_channel: true,
        },
        calibration: None,
    };

    let serialized = convert_flat_model(&model, &options)?;
    std::fs::write(&args[2], &serialized)?;
    println!("Wrote {} bytes to '{}'", serialized.len(), args[2]);

    // Round-trip sanity check
    let restored = read_model(&serialized)?;
    println!(
        "Verified: {} nodes, {} tensors",
        restored.node_count(),
        restored.tensor_count()
    );

    Ok(())
}
