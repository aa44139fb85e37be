/*
Copyright 2024-2025 The Graphbridge Authors

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

     https://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

#![allow(clippy::missing_errors_doc)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use opentelemetry::global;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::Resource;
use projection::{descriptor, proto, sdl, Catalog};
use rpc_client::{RpcClient, RpcClientOptions, StaticEndpointProvider};
use runtime::{Config, Runtime};
use snafu::prelude::*;
use telemetry::EventBus;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Schema compilation failed: {source}"))]
    Compile { source: schema::Error },

    #[snafu(display("Schema projection failed: {source}"))]
    Project { source: projection::Error },

    #[snafu(display("Unable to write {}: {source}", path.display()))]
    WriteOutput {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to start the bridge runtime: {source}"))]
    Serve { source: runtime::Error },

    #[snafu(display("Unable to initialize metrics: {source}"))]
    InitializeMetrics {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Parser, Debug)]
#[clap(about = "GraphQL-to-RPC bridge")]
#[clap(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile the schema project and serve GraphQL over HTTP.
    Serve(ServeArgs),
    /// Compile the schema project and write the client-facing SDL.
    CompileSdl(CompileSdlArgs),
    /// Compile the schema project and write one proto file per service.
    CompileProto(CompileProtoArgs),
}

#[derive(Parser, Debug)]
pub struct ServeArgs {
    #[clap(flatten)]
    pub config: Config,
}

#[derive(Parser, Debug)]
pub struct CompileSdlArgs {
    /// Directory holding the schema project.
    #[arg(long, value_name = "DIR", default_value = "./schema")]
    pub schema_root: PathBuf,

    /// Root package for generated services and messages.
    #[arg(long, value_name = "NAME", default_value = "bridge")]
    pub root_package: String,

    /// Output file for the client schema.
    #[arg(short, long, value_name = "FILE", default_value = "schema.graphql")]
    pub output: PathBuf,
}

#[derive(Parser, Debug)]
pub struct CompileProtoArgs {
    /// Directory holding the schema project.
    #[arg(long, value_name = "DIR", default_value = "./schema")]
    pub schema_root: PathBuf,

    /// Root package for generated services and messages.
    #[arg(long, value_name = "NAME", default_value = "bridge")]
    pub root_package: String,

    /// Output directory for the proto tree.
    #[arg(short, long, value_name = "DIR", default_value = "proto")]
    pub out_dir: PathBuf,
}

pub async fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Serve(serve) => serve_bridge(serve).await,
        Command::CompileSdl(compile) => compile_sdl(&compile),
        Command::CompileProto(compile) => compile_proto(&compile),
    }
}

async fn serve_bridge(args: ServeArgs) -> Result<()> {
    let config = args.config;

    let project = Arc::new(
        schema::compile(&config.schema_root, &config.root_package).context(CompileSnafu)?,
    );
    let catalog = Catalog::project(&project).context(ProjectSnafu)?;
    let descriptors = descriptor::build_pool(&catalog).context(ProjectSnafu)?;
    tracing::info!(
        "Compiled {} schema files into {} services with {} RPCs",
        project.files().len(),
        catalog.files.len(),
        catalog.method_count(),
    );

    let bus = EventBus::default();
    let prometheus_registry = if config.metrics.is_some() {
        let registry = prometheus::Registry::new();
        init_metrics(registry.clone())?;
        telemetry::metrics::attach(&bus);
        Some(registry)
    } else {
        None
    };

    let endpoints = Arc::new(StaticEndpointProvider::from_pairs(config.backends.clone()));
    let rpc_client = Arc::new(RpcClient::new(
        descriptors,
        endpoints,
        RpcClientOptions {
            max_conns_per_endpoint: config.max_conns_per_endpoint,
            default_timeout: config.rpc_timeout(),
        },
        bus.clone(),
    ));

    let bridge = Runtime::builder()
        .with_project(project)
        .with_dispatcher(rpc_client)
        .with_bus(bus)
        .with_metrics_server_opt(config.metrics, prometheus_registry)
        .build()
        .context(ServeSnafu)?;

    Arc::new(bridge).start_servers(config).await.context(ServeSnafu)
}

fn compile_sdl(args: &CompileSdlArgs) -> Result<()> {
    let project =
        schema::compile(&args.schema_root, &args.root_package).context(CompileSnafu)?;
    let rendered = sdl::render_client_schema(&project);
    write_output(&args.output, rendered.as_bytes())?;
    tracing::info!("Wrote the client schema to {}", args.output.display());
    Ok(())
}

fn compile_proto(args: &CompileProtoArgs) -> Result<()> {
    let project =
        schema::compile(&args.schema_root, &args.root_package).context(CompileSnafu)?;
    let catalog = Catalog::project(&project).context(ProjectSnafu)?;
    for file in &catalog.files {
        let path = args.out_dir.join(&file.proto_path);
        write_output(&path, proto::render_file(file).as_bytes())?;
        tracing::info!("Wrote {}", path.display());
    }
    Ok(())
}

fn write_output(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context(WriteOutputSnafu {
                path: path.to_path_buf(),
            })?;
        }
    }
    std::fs::write(path, contents).context(WriteOutputSnafu {
        path: path.to_path_buf(),
    })
}

fn init_metrics(registry: prometheus::Registry) -> Result<()> {
    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry)
        .without_scope_info()
        .without_units()
        .without_counter_suffixes()
        .without_target_info()
        .build()
        .map_err(|e| Error::InitializeMetrics {
            source: Box::new(e),
        })?;

    let provider = SdkMeterProvider::builder()
        .with_resource(Resource::default())
        .with_reader(exporter)
        .build();
    global::set_meter_provider(provider);

    Ok(())
}
