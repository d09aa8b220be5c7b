//! huffstream: Huffman-compressed file transfer
//!
//! Runs either end of the dual-channel protocol, or the codec on its own:
//!
//! ```text
//! huffstream serve --save-dir received_files
//! huffstream send report.txt
//! huffstream status <transfer-id>
//! huffstream encode in.bin in.huff && huffstream decode in.huff out.bin
//! ```

mod config;
mod input_gen;
mod logging;

use clap::Parser;
use config::{Cli, Command};
use huffstream_core::{huffman, legacy, Client, NetConfig, Result, Server};
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info};

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging(cli.global.verbose) {
        eprintln!("failed to initialize logging: {e}");
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut net = cli.global.resolve()?;
    config::apply_command(&mut net, &cli.command);

    match cli.command {
        Command::Serve { .. } => serve(&net),
        Command::Send { file, .. } => send(&net, &file),
        Command::Status { transfer_id } => {
            let mut client = Client::connect(&net)?;
            println!("{transfer_id}: {}", client.status(&transfer_id)?);
            client.close();
            Ok(())
        }
        Command::Cancel { transfer_id } => {
            let mut client = Client::connect(&net)?;
            println!("{transfer_id}: {}", client.cancel(&transfer_id)?);
            client.close();
            Ok(())
        }
        Command::Encode { input, output } => encode_file(&input, &output),
        Command::Decode { input, output } => decode_file(&input, &output),
        Command::Sample { output, seed, size } => {
            let seed = seed.unwrap_or_else(input_gen::time_seed);
            input_gen::write_sample(&output, seed, size)?;
            println!("Wrote {size} bytes to {} (seed {seed})", output.display());
            Ok(())
        }
        Command::LegacySend { file } => {
            let header = legacy::send_file(&net, &file)?;
            println!("Sent {} ({} bytes)", header.filename, header.filesize);
            Ok(())
        }
        Command::LegacyReceive { .. } => {
            let receipt = legacy::receive_one(&net)?;
            println!("Received: {}", receipt.encoded_path.display());
            println!("Decoded:  {}", receipt.decoded_path.display());
            Ok(())
        }
    }
}

fn serve(net: &NetConfig) -> Result<()> {
    let server = Server::start(net)?;
    println!(
        "Listening: control {} / data {}",
        server.control_addr(),
        server.data_addr()
    );
    println!("Saving to {}", net.save_directory.display());
    server.wait();
    Ok(())
}

fn send(net: &NetConfig, file: &Path) -> Result<()> {
    config::print(net);
    let mut client = Client::connect(net)?;
    let report = client.send_file(file)?;
    let status = client.status(&report.transfer_id)?;
    client.close();

    report.print_summary();
    println!("Server status: {status}");
    Ok(())
}

fn encode_file(input: &Path, output: &Path) -> Result<()> {
    let data = std::fs::read(input)?;
    let (payload, ratio) = huffman::encode(&data)?;
    std::fs::write(output, &payload)?;

    info!(input = %input.display(), output = %output.display(), "file encoded");
    println!("Original: {} bytes", data.len());
    println!("Encoded:  {} bytes", payload.len());
    println!("Ratio:    {ratio:.2}% saved");
    Ok(())
}

fn decode_file(input: &Path, output: &Path) -> Result<()> {
    let payload = std::fs::read(input)?;
    let data = huffman::decode(&payload)?;
    std::fs::write(output, &data)?;

    info!(input = %input.display(), output = %output.display(), "file decoded");
    println!("Decoded {} bytes to {}", data.len(), output.display());
    Ok(())
}
