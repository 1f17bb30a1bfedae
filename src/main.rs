// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context as AnyhowContext, Result};
use axum::{routing::get, Router};
use clap::Parser;
use dnslb::{
    cache::{CacheBuilder, CacheEventKind, ObjectKey},
    cli::Options,
    constants::{
        DEFAULT_LEASE_DURATION_SECS, DEFAULT_LEASE_RETRY_PERIOD_SECS, DNS_WORKERS,
        ENDPOINT_WORKERS, HEALTHZ_PATH, HTTP_SERVER_BIND_ADDRESS, LEASE_NAME, METRICS_PATH,
        PROVIDER_WORKERS, SHUTDOWN_DEADLINE_SECS, TOKIO_WORKER_THREADS,
    },
    context::{endpoint_subkeys, Context},
    crd::{DNSLoadBalancer, DNSLoadBalancerEndpoint, DNSProvider},
    dns::lookup::SystemResolver,
    dns::provider::{ProviderRegistry, ProviderTypes, Properties},
    dns::route53::Route53Factory,
    healthz,
    labels::{ANNOTATION_LOAD_BALANCER, ANNOTATION_SOURCE},
    metrics,
    reconcilers::endpoint::ingress::IngressSourceType,
    reconcilers::endpoint::service::ServiceSourceType,
    reconcilers::endpoint::sources::{SourceKey, SourceKind, SourceTypes},
    reconcilers::endpoint::{EndpointReconciler, SharedUsages},
    reconcilers::lb::watch::ReqwestProber,
    reconcilers::lb::{DnsReconciler, DNS_TICK_KEY},
    reconcilers::provider::ProviderReconciler,
    reconcilers::run_worker,
    scheduler::WorkQueue,
};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::{Api, Client, Resource, ResourceExt};
use kube_lease_manager::LeaseManagerBuilder;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info, warn};

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("dnslb-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

/// Initialize logging with custom format.
///
/// `RUST_LOG` overrides the `--log-level` default;
/// `RUST_LOG_FORMAT=json|text` selects the output format.
fn initialize_logging(options: &Options) -> Result<()> {
    let default_filter = options.log_filter()?;
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!("starting DNS load balancer controller");
    Ok(())
}

/// Build a client from a kubeconfig path, or the in-cluster default.
async fn client_for(kubeconfig: &str) -> Result<Client> {
    if kubeconfig.is_empty() {
        return Client::try_default()
            .await
            .context("cannot create in-cluster client");
    }
    let config = kube::config::Kubeconfig::read_from(kubeconfig)
        .with_context(|| format!("cannot read kubeconfig '{kubeconfig}'"))?;
    let config = kube::Config::from_custom_kubeconfig(
        config,
        &kube::config::KubeConfigOptions::default(),
    )
    .await
    .with_context(|| format!("cannot load kubeconfig '{kubeconfig}'"))?;
    Client::try_from(config).context("cannot create client")
}

/// Serve `/healthz` and `/metrics` when `--port` is set.
fn start_http_server(port: u16) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = Router::new()
            .route(HEALTHZ_PATH, get(healthz::healthz_handler))
            .route(METRICS_PATH, get(metrics::metrics_handler));
        let bind_addr = format!("{HTTP_SERVER_BIND_ADDRESS}:{port}");
        let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(listener) => listener,
            Err(err) => {
                error!("cannot bind http server to {bind_addr}: {err}");
                return;
            }
        };
        info!("http server listening on http://{bind_addr}");
        if let Err(err) = axum::serve(listener, app).await {
            error!("http server error: {err}");
        }
    })
}

/// Register static providers from the ambient environment.
async fn register_static_providers(ctx: &Context) {
    let wanted = ctx.options.providers.as_str();
    let types: Vec<String> = match wanted {
        "static" | "all" => ctx.provider_types.names(),
        "dynamic" => return,
        name => vec![name.to_string()],
    };
    for type_name in types {
        let Some(factory) = ctx.provider_types.get(&type_name) else {
            warn!("unknown static provider type '{type_name}'");
            continue;
        };
        let name = format!("static/{type_name}");
        match factory
            .create(&name, Properties::new(), ctx.options.dry_run)
            .await
        {
            Ok(provider) => match ctx.registry.register(&name, provider, None) {
                Ok(_) => info!("registered static provider '{name}'"),
                Err(err) => warn!("cannot register static provider '{name}': {err}"),
            },
            Err(err) => warn!("cannot create static provider '{name}': {err}"),
        }
    }
}

/// Wait for a termination signal (SIGHUP, SIGINT, SIGTERM or SIGQUIT).
/// A second signal aborts the process immediately.
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let handlers = (
        signal(SignalKind::hangup()),
        signal(SignalKind::terminate()),
        signal(SignalKind::quit()),
    );
    let (mut sighup, mut sigterm, mut sigquit) = match handlers {
        (Ok(sighup), Ok(sigterm), Ok(sigquit)) => (sighup, sigterm, sigquit),
        _ => {
            error!("cannot install signal handlers");
            std::future::pending::<()>().await;
            unreachable!()
        }
    };
    tokio::select! {
        _ = sighup.recv() => info!("received SIGHUP, initiating graceful shutdown"),
        _ = tokio::signal::ctrl_c() => info!("received SIGINT, initiating graceful shutdown"),
        _ = sigterm.recv() => info!("received SIGTERM, initiating graceful shutdown"),
        _ = sigquit.recv() => info!("received SIGQUIT, initiating graceful shutdown"),
    }

    // a second signal aborts immediately
    tokio::spawn(async {
        let mut sighup = signal(SignalKind::hangup()).expect("signal handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("signal handler");
        let mut sigquit = signal(SignalKind::quit()).expect("signal handler");
        tokio::select! {
            _ = sighup.recv() => {}
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
            _ = sigquit.recv() => {}
        }
        error!("second signal received, aborting");
        std::process::exit(0);
    });
}

/// Wait until this replica holds the leader lease.
async fn acquire_leadership(
    client: Client,
) -> Result<watch::Receiver<bool>> {
    let namespace = std::env::var("POD_NAMESPACE").unwrap_or_else(|_| "dns-system".to_string());
    let identity = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("dnslb-{}", rand::random::<u32>()));

    info!(
        lease = LEASE_NAME,
        namespace, identity, "leader election enabled, waiting to acquire leadership"
    );
    let manager = LeaseManagerBuilder::new(client, LEASE_NAME)
        .with_namespace(namespace)
        .with_identity(identity)
        .with_duration(DEFAULT_LEASE_DURATION_SECS)
        .with_grace(DEFAULT_LEASE_RETRY_PERIOD_SECS)
        .build()
        .await?;
    let (leader_rx, _lease_handle) = manager.watch().await;

    let mut rx = leader_rx.clone();
    while !*rx.borrow_and_update() {
        rx.changed().await?;
    }
    info!("leadership acquired, starting controllers");
    Ok(leader_rx)
}

/// Resolves when leadership is lost.
async fn leadership_lost(mut leader_rx: watch::Receiver<bool>) {
    loop {
        if leader_rx.changed().await.is_err() {
            return;
        }
        if !*leader_rx.borrow() {
            return;
        }
    }
}

async fn async_main() -> Result<()> {
    let options = Options::parse();
    initialize_logging(&options)?;
    options.validate()?;

    if !options.plugin_dir.is_empty() {
        warn!(
            "--plugin-dir is accepted for compatibility but native plugins are not supported"
        );
    }

    let source_client = client_for(&options.kubeconfig).await?;
    let target_client = if options.targetkube.is_empty() {
        source_client.clone()
    } else {
        client_for(&options.targetkube).await?
    };

    let registry = Arc::new(ProviderRegistry::new());
    let provider_types =
        Arc::new(ProviderTypes::new().with(Arc::new(Route53Factory::new(options.dry_run))));
    let resolver = Arc::new(SystemResolver::from_system_conf()?);
    let prober = Arc::new(ReqwestProber::new()?);
    let usages = Arc::new(SharedUsages::new());

    let (cancel_tx, cancel_rx) = watch::channel(false);

    // per-controller work queues
    let endpoint_queue: WorkQueue<SourceKey> = WorkQueue::new("endpoint");
    let dns_queue: WorkQueue<String> = WorkQueue::new("dns");
    let provider_queue: WorkQueue<ObjectKey> = WorkQueue::new("provider");

    // watch caches with event fanout into the queues
    let lbs = {
        let usages = usages.clone();
        let endpoint_queue = endpoint_queue.clone();
        CacheBuilder::<DNSLoadBalancer>::new(Api::all(target_client.clone()))
            .handler(move |_kind, lb: &DNSLoadBalancer| {
                let key = ObjectKey::of(lb);
                for user in usages.users_of(&key) {
                    endpoint_queue.add_changed(user);
                }
            })
            .spawn(cancel_rx.clone())
    };
    let endpoints = {
        let endpoint_queue = endpoint_queue.clone();
        CacheBuilder::<DNSLoadBalancerEndpoint>::new(Api::all(target_client.clone()))
            .subkey(endpoint_subkeys)
            .handler(move |_kind, ep: &DNSLoadBalancerEndpoint| {
                let source = ep
                    .metadata
                    .annotations
                    .as_ref()
                    .and_then(|annotations| annotations.get(ANNOTATION_SOURCE))
                    .and_then(|value| SourceKey::parse_label_value(value));
                if let Some(source) = source {
                    endpoint_queue.add(source);
                }
            })
            .spawn(cancel_rx.clone())
    };
    let services = {
        let endpoint_queue = endpoint_queue.clone();
        CacheBuilder::<Service>::new(Api::all(source_client.clone()))
            .handler(move |kind, service: &Service| {
                if relevant_source(kind, service.annotations(), service.meta()) {
                    let key = SourceKey {
                        kind: SourceKind::Service,
                        key: ObjectKey::of(service),
                    };
                    endpoint_queue.add_changed(key);
                }
            })
            .spawn(cancel_rx.clone())
    };
    let ingresses = {
        let endpoint_queue = endpoint_queue.clone();
        CacheBuilder::<Ingress>::new(Api::all(source_client.clone()))
            .handler(move |kind, ingress: &Ingress| {
                if relevant_source(kind, ingress.annotations(), ingress.meta()) {
                    let key = SourceKey {
                        kind: SourceKind::Ingress,
                        key: ObjectKey::of(ingress),
                    };
                    endpoint_queue.add_changed(key);
                }
            })
            .spawn(cancel_rx.clone())
    };

    let dynamic_providers = matches!(options.providers.as_str(), "dynamic" | "all");
    let run_provider_controller = options.runs("provider") && dynamic_providers;
    let provider_cache = if run_provider_controller {
        let provider_queue = provider_queue.clone();
        Some(
            CacheBuilder::<DNSProvider>::new(Api::all(target_client.clone()))
                .handler(move |_kind, provider: &DNSProvider| {
                    provider_queue.add_changed(ObjectKey::of(provider));
                })
                .spawn(cancel_rx.clone()),
        )
    } else {
        None
    };

    let source_types = SourceTypes::new()
        .with(Arc::new(ServiceSourceType::new(services.clone())))
        .with(Arc::new(IngressSourceType::new(ingresses.clone())));

    let ctx = Arc::new(Context {
        options: options.clone(),
        source_client: source_client.clone(),
        target_client: target_client.clone(),
        lbs,
        endpoints,
        services,
        ingresses,
        source_types,
        registry,
        provider_types,
        resolver,
        prober,
        usages,
        started: Instant::now(),
    });

    if options.port > 0 {
        let _http_handle = start_http_server(options.port);
    }

    register_static_providers(&ctx).await;

    // leader election gates the worker pools
    let leader_election = std::env::var("DNSLB_ENABLE_LEADER_ELECTION")
        .map(|v| v.parse::<bool>().unwrap_or(true))
        .unwrap_or(true);
    let leader_rx = if leader_election {
        Some(acquire_leadership(target_client.clone()).await?)
    } else {
        warn!("leader election DISABLED - running without high availability");
        None
    };

    info!("waiting for caches to sync");
    ctx.lbs.wait_for_sync().await;
    ctx.endpoints.wait_for_sync().await;
    if options.runs("endpoint") {
        ctx.services.wait_for_sync().await;
        ctx.ingresses.wait_for_sync().await;
    }
    if let Some(cache) = &provider_cache {
        cache.wait_for_sync().await;
    }
    info!("caches synchronized");

    // worker pools
    let mut workers = Vec::new();
    if options.runs("endpoint") {
        healthz::start("endpoint", healthz::default_timeout(options.interval));
        let reconciler = Arc::new(EndpointReconciler::new(ctx.clone()));
        for no in 0..ENDPOINT_WORKERS {
            workers.push(tokio::spawn(run_worker(
                "endpoint",
                no,
                endpoint_queue.clone(),
                reconciler.clone(),
                cancel_rx.clone(),
            )));
        }
    }
    let mut once_rx = None;
    if options.runs("dns") {
        healthz::start("dns", healthz::default_timeout(options.interval));
        let mut reconciler = DnsReconciler::new(ctx.clone());
        if options.once {
            let (tx, rx) = tokio::sync::oneshot::channel();
            reconciler = reconciler.with_once_signal(tx);
            once_rx = Some(rx);
        }
        let reconciler = Arc::new(reconciler);
        for no in 0..DNS_WORKERS {
            workers.push(tokio::spawn(run_worker(
                "dns",
                no,
                dns_queue.clone(),
                reconciler.clone(),
                cancel_rx.clone(),
            )));
        }
        dns_queue.add(DNS_TICK_KEY.to_string());
    }
    if run_provider_controller {
        healthz::start("provider", healthz::default_timeout(options.interval));
        let cache = provider_cache.clone().expect("provider cache");
        let reconciler = Arc::new(ProviderReconciler::new(ctx.clone(), cache));
        for no in 0..PROVIDER_WORKERS {
            workers.push(tokio::spawn(run_worker(
                "provider",
                no,
                provider_queue.clone(),
                reconciler.clone(),
                cancel_rx.clone(),
            )));
        }
    }

    // run until a signal, the configured duration, a single-run
    // completion, or loss of leadership
    let duration_timer = async {
        if options.duration > 0 {
            tokio::time::sleep(Duration::from_secs(options.duration)).await;
            info!("configured duration elapsed, shutting down");
        } else {
            std::future::pending::<()>().await;
        }
    };
    let once_done = async {
        match once_rx {
            Some(rx) => {
                let _ = rx.await;
                info!("single reconciliation finished, shutting down");
            }
            None => std::future::pending::<()>().await,
        }
    };
    let lost = async {
        match leader_rx {
            Some(rx) => leadership_lost(rx).await,
            None => std::future::pending::<()>().await,
        }
    };

    let mut lost_leadership = false;
    tokio::select! {
        () = shutdown_signal() => {}
        () = duration_timer => {}
        () = once_done => {}
        () = lost => { lost_leadership = true; }
    }

    stop_workers(&cancel_tx, &endpoint_queue, &dns_queue, &provider_queue, workers).await;

    if lost_leadership {
        // keep the process (and its health endpoints) alive until
        // terminated; a restarted pod re-enters the election
        warn!("leadership lost, workers stopped");
        healthz::end("endpoint");
        healthz::end("dns");
        healthz::end("provider");
        shutdown_signal().await;
    }
    info!("graceful shutdown completed");
    Ok(())
}

/// Stop every worker pool and wait for the in-flight items to drain.
async fn stop_workers(
    cancel_tx: &watch::Sender<bool>,
    endpoint_queue: &WorkQueue<SourceKey>,
    dns_queue: &WorkQueue<String>,
    provider_queue: &WorkQueue<ObjectKey>,
    workers: Vec<tokio::task::JoinHandle<()>>,
) {
    let _ = cancel_tx.send(true);
    endpoint_queue.shutdown();
    dns_queue.shutdown();
    provider_queue.shutdown();

    let drain = futures::future::join_all(workers);
    if tokio::time::timeout(Duration::from_secs(SHUTDOWN_DEADLINE_SECS), drain)
        .await
        .is_err()
    {
        error!("workers did not drain within {SHUTDOWN_DEADLINE_SECS}s, exiting");
    }
}

/// Whether a source object deserves endpoint reconciliation: it carries the
/// annotation now, or carries our finalizer from an earlier annotation.
fn relevant_source(
    _kind: CacheEventKind,
    annotations: &std::collections::BTreeMap<String, String>,
    meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta,
) -> bool {
    if annotations.contains_key(ANNOTATION_LOAD_BALANCER) {
        return true;
    }
    meta.finalizers
        .as_ref()
        .is_some_and(|finalizers| {
            finalizers
                .iter()
                .any(|f| f == dnslb::labels::FINALIZER_SOURCE)
        })
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod main_tests;
