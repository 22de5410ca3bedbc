/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! `entropy_estimator_util`: a thin driver binary wiring CLI
//! arguments, logging, the config record, the I/O layer, and the
//! orchestrator together. Argument handling beyond a flat
//! pass-through into `EstimatorConfig` is intentionally out of scope.

use std::fs;
use std::process::ExitCode as ProcessExitCode;

use entropy_estimator::config::EstimatorConfig;
use entropy_estimator::errors::ExitCode;
use entropy_estimator::io::{self, SampleWidth};
use entropy_estimator::orchestrator;
use entropy_estimator::rng::Rng;

const GIT_VERSION: &str = git_version::git_version!(fallback = "unknown");

struct Args {
    input_path: String,
    block_len: usize,
    ascii: bool,
    width: Option<SampleWidth>,
    verbose: bool,
    bootstrap_params: bool,
    deterministic_seed: Option<u64>,
    report_iid_track: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut raw = pico_args::Arguments::from_env();

    if raw.contains(["-h", "--help"]) {
        print_usage();
        std::process::exit(0);
    }
    if raw.contains(["-V", "--version"]) {
        println!("entropy_estimator_util {}", GIT_VERSION);
        std::process::exit(0);
    }

    let args = Args {
        block_len: raw.opt_value_from_str("--block-len")?.unwrap_or(1_000_000),
        ascii: raw.contains("--ascii"),
        width: raw
            .opt_value_from_str::<_, String>("--width")?
            .map(|w| match w.as_str() {
                "8" => Ok(SampleWidth::U8),
                "16" => Ok(SampleWidth::U16),
                "32" => Ok(SampleWidth::U32),
                "64" => Ok(SampleWidth::U64),
                other => Err(anyhow::anyhow!("{}: unrecognized --width value {:?}", ExitCode::Unsupported, other)),
            })
            .transpose()?,
        verbose: raw.contains(["-v", "--verbose"]),
        bootstrap_params: raw.contains("--bootstrap-params"),
        deterministic_seed: raw.opt_value_from_str("--seed")?,
        report_iid_track: raw.contains("--iid-track"),
        input_path: raw.free_from_str()?,
    };

    let remaining = raw.finish();
    if !remaining.is_empty() {
        anyhow::bail!("{}: unrecognized arguments: {:?}", ExitCode::Unsupported, remaining);
    }

    Ok(args)
}

fn print_usage() {
    println!(
        "entropy_estimator_util {}\n\n\
         Runs the NIST SP 800-90B non-IID min-entropy estimator battery over a sample file.\n\n\
         USAGE:\n    entropy_estimator_util [OPTIONS] <input>\n\n\
         OPTIONS:\n\
         \x20   --ascii                 read one integer/float per line instead of binary\n\
         \x20   --width <8|16|32|64>    binary sample width in bits (default: inferred from filename)\n\
         \x20   --block-len <N>         samples per block (default: 1000000)\n\
         \x20   --bootstrap-params      enable parameter-level bootstrap (requires >= 200 blocks)\n\
         \x20   --seed <N>              force a deterministic RNG seed\n\
         \x20   --iid-track             also report the MCV-only IID-assumption entropy\n\
         \x20   -v, --verbose           enable debug/info logging\n\
         \x20   -V, --version           print version and exit\n\
         \x20   -h, --help              print this message",
        GIT_VERSION
    );
}

fn init_logging(verbose: bool) {
    let level = if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Warn };
    simple_logger::SimpleLogger::new().with_level(level).init().expect("failed to initialize logger");
}

fn run() -> anyhow::Result<()> {
    let args = parse_args()?;
    init_logging(args.verbose);

    log::info!("entropy_estimator_util {} starting on {}", GIT_VERSION, args.input_path);

    let raw_samples = if args.ascii {
        let text = fs::read_to_string(&args.input_path)?;
        io::read_ascii(&text)?
    } else {
        let bytes = fs::read(&args.input_path)?;
        let width = args
            .width
            .or_else(|| io::infer_width_from_filename(&args.input_path))
            .ok_or_else(|| anyhow::anyhow!("{}: cannot infer sample width; pass --width", ExitCode::Unsupported))?;
        io::read_binary_le(&bytes, width)?
    };

    log::info!("read {} raw samples", raw_samples.len());

    let config = {
        let mut builder = EstimatorConfig::builder()
            .verbose(args.verbose)
            .bootstrap_params(args.bootstrap_params);
        if let Some(seed) = args.deterministic_seed {
            builder = builder.deterministic(seed);
        }
        builder.build()
    };

    let mut rng = if config.deterministic {
        Rng::from_seed(config.seed)
    } else {
        Rng::from_entropy()
    };

    let assessment = orchestrator::assess(&raw_samples, args.block_len, &config, args.report_iid_track, &mut rng)?;

    print!("{}", io::write_report(&assessment));

    Ok(())
}

fn main() -> ProcessExitCode {
    match run() {
        Ok(()) => ProcessExitCode::SUCCESS,
        Err(e) => {
            eprintln!("entropy_estimator_util: {:#}", e);
            ProcessExitCode::FAILURE
        }
    }
}
