use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use vcuda_server::cudart::CudartRuntime;
use vcuda_server::runtime::UnavailableRuntime;
use vcuda_server::NativeRuntime;

#[derive(Parser)]
#[command(name = "vcuda")]
#[command(about = "vcuda - CUDA runtime backend for virtualized guests")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the backend daemon (serves guest registration requests)
    Server {
        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address (overrides the config file)
        #[arg(short, long)]
        bind: Option<String>,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<String>,

        /// Path to the CUDA runtime library (overrides the config file)
        #[arg(long)]
        runtime_lib: Option<String>,

        /// Write PID to this file (for service managers)
        #[arg(long)]
        pid_file: Option<String>,
    },

    /// Check that the CUDA runtime library can be loaded
    Check {
        /// Path to the CUDA runtime library
        #[arg(long)]
        runtime_lib: Option<String>,
    },

    /// List the routines the backend serves
    Routines,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    vcuda_common::init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server {
            port,
            bind,
            config,
            runtime_lib,
            pid_file,
        } => {
            let config_path = config.unwrap_or_else(vcuda_core::config::default_config_path);
            let mut vcuda_config = vcuda_core::config::VcudaConfig::load_or_default(&config_path);
            if let Some(port) = port {
                vcuda_config.server.port = port;
            }
            if let Some(bind) = bind {
                vcuda_config.server.bind = bind;
            }
            if runtime_lib.is_some() {
                vcuda_config.runtime.library_path = runtime_lib;
            }

            if let Some(ref path) = pid_file {
                std::fs::write(path, std::process::id().to_string())?;
            }

            info!(
                "starting vcuda backend on {}",
                vcuda_config.server.bind_address()
            );

            let runtime: Arc<dyn NativeRuntime> =
                match CudartRuntime::load(vcuda_config.runtime.library_path.as_deref()) {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        warn!("CUDA runtime unavailable, every routine will fail: {}", e);
                        Arc::new(UnavailableRuntime)
                    }
                };

            let server = vcuda_server::VcudaServer::new(vcuda_config.server, runtime);
            let result = server
                .run()
                .await
                .map_err(|e| anyhow::anyhow!("{}", e));

            if let Some(ref path) = pid_file {
                let _ = std::fs::remove_file(path);
            }

            result?;
        }

        Commands::Check { runtime_lib } => match CudartRuntime::load(runtime_lib.as_deref()) {
            Ok(_) => println!("CUDA runtime loaded ({})", vcuda_common::platform::platform_name()),
            Err(e) => {
                println!("CUDA runtime not usable: {}", e);
                println!(
                    "searched: {}",
                    vcuda_common::platform::runtime_library_names().join(", ")
                );
                std::process::exit(1);
            }
        },

        Commands::Routines => {
            for routine in vcuda_protocol::RoutineId::ALL {
                println!("{:>3}  {}", routine.as_u32(), routine.name());
            }
        }
    }

    Ok(())
}
