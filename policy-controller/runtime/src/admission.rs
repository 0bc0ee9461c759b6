use crate::{
    core::{
        integrity::{Candidate, Rules},
        modules, resolve, Error as PolicyError, Identity,
    },
    guard::{PreconditionGuard, ReferentialIntegrityGuard},
    k8s::{Configuration, Context, Namespace, Policy},
    lister::Lister,
    metrics::AdmissionMetrics,
};
use anyhow::{anyhow, Result};
use futures::future;
use http_body_util::BodyExt;
use hyper::{http, Request, Response};
use kube::{
    core::{admission::Operation, DynamicObject},
    Resource, ResourceExt,
};
use serde::de::DeserializeOwned;
use std::future::Future;
use thiserror::Error;
use tokio::time;
use tracing::{debug, info, trace, warn};

#[derive(Clone)]
pub struct Admission<L> {
    lister: L,
    guard: ReferentialIntegrityGuard<L>,
    timeout: time::Duration,
    metrics: AdmissionMetrics,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Request(#[from] hyper::Error),

    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),
}

type AdmissionRequest = kube::core::admission::AdmissionRequest<DynamicObject>;
type AdmissionResponse = kube::core::admission::AdmissionResponse;
type AdmissionReview = kube::core::admission::AdmissionReview<DynamicObject>;

#[async_trait::async_trait]
trait Validate<T> {
    async fn validate(
        self,
        ns: &str,
        name: &str,
        obj: T,
    ) -> Result<()>;
}

type Body = http_body_util::Full<bytes::Bytes>;

// === impl AdmissionService ===

impl<L> tower::Service<Request<hyper::body::Incoming>> for Admission<L>
where
    L: Lister + Clone + 'static,
{
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<hyper::body::Incoming>) -> Self::Future {
        trace!(?req);
        if req.method() != http::Method::POST || req.uri().path() != "/" {
            return Box::pin(future::ok(
                Response::builder()
                    .status(http::StatusCode::NOT_FOUND)
                    .body(Body::default())
                    .expect("not found response must be valid"),
            ));
        }

        let admission = self.clone();
        Box::pin(async move {
            use bytes::Buf;
            let bytes = req.into_body().collect().await?.to_bytes();
            let review: AdmissionReview = match serde_json::from_reader(bytes.reader()) {
                Ok(review) => review,
                Err(error) => {
                    warn!(%error, "Failed to parse request body");
                    return json_response(AdmissionResponse::invalid(error).into_review());
                }
            };
            trace!(?review);

            let rsp = match review.try_into() {
                Ok(req) => {
                    debug!(?req);
                    admission.admit(req).await
                }
                Err(error) => {
                    warn!(%error, "Invalid admission request");
                    AdmissionResponse::invalid(error)
                }
            };
            debug!(?rsp);
            json_response(rsp.into_review())
        })
    }
}

impl<L> Admission<L>
where
    L: Lister + Clone + 'static,
{
    pub fn new(lister: L, rules: Rules, timeout: time::Duration, metrics: AdmissionMetrics) -> Self {
        Self {
            guard: ReferentialIntegrityGuard::new(lister.clone(), rules, timeout),
            lister,
            timeout,
            metrics,
        }
    }

    async fn admit(self, req: AdmissionRequest) -> AdmissionResponse {
        let kind = req.kind.kind.clone();
        let operation = operation_name(&req.operation);
        let metrics = self.metrics.clone();

        let rsp = match req.operation {
            Operation::Delete => self.admit_delete(req).await,
            Operation::Create | Operation::Update => self.admit_change(req).await,
            _ => AdmissionResponse::from(&req),
        };

        metrics.observe(&kind, operation, rsp.allowed);
        rsp
    }

    async fn admit_delete(self, req: AdmissionRequest) -> AdmissionResponse {
        if !(is_kind::<Context>(&req) || is_kind::<Namespace>(&req) || is_kind::<Policy>(&req)) {
            return unsupported(&req);
        }

        let rsp = AdmissionResponse::from(&req);
        let candidate = match req.old_object.as_ref() {
            Some(obj) => Candidate {
                id: Identity::new(
                    req.kind.kind.clone(),
                    obj.namespace().unwrap_or_default(),
                    obj.name_any(),
                ),
                annotations: obj.annotations().clone(),
            },
            None => Candidate::new(Identity::new(
                req.kind.kind.clone(),
                req.namespace.clone().unwrap_or_default(),
                req.name.clone(),
            )),
        };

        if let Err(error) = self.guard.check(&candidate).await {
            info!(%error, candidate = %candidate.id, "Deletion denied");
            return rsp.deny(error);
        }

        rsp
    }

    async fn admit_change(self, req: AdmissionRequest) -> AdmissionResponse {
        if is_kind::<Configuration>(&req) {
            return self.admit_object::<Configuration>(req).await;
        }

        if is_kind::<Policy>(&req) {
            return self.admit_object::<Policy>(req).await;
        }

        unsupported(&req)
    }

    async fn admit_object<T>(self, req: AdmissionRequest) -> AdmissionResponse
    where
        T: DeserializeOwned,
        Self: Validate<T>,
    {
        let rsp = AdmissionResponse::from(&req);

        let kind = req.kind.kind.clone();
        let (obj, typed) = match parse_object::<T>(req) {
            Ok(obj) => obj,
            Err(error) => {
                info!(%error, "Failed to parse {}", kind);
                return rsp.deny(error);
            }
        };

        let ns = obj.namespace().unwrap_or_default();
        let name = obj.name_any();
        if let Err(error) = self.validate(&ns, &name, typed).await {
            info!(%error, %ns, %name, %kind, "Denied");
            return rsp.deny(error);
        }

        rsp
    }

    /// Bounds a lister call by the admission timeout.
    async fn list<T>(&self, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        time::timeout(self.timeout, fut)
            .await
            .map_err(|_| anyhow!("timed out after {:?} listing {}", self.timeout, what))?
    }
}

fn is_kind<T>(req: &AdmissionRequest) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    req.kind.group.eq_ignore_ascii_case(&T::group(&dt))
        && req.kind.kind.eq_ignore_ascii_case(&T::kind(&dt))
}

fn unsupported(req: &AdmissionRequest) -> AdmissionResponse {
    AdmissionResponse::invalid(format_args!(
        "unsupported resource type: {}.{}.{}",
        req.kind.group, req.kind.version, req.kind.kind
    ))
}

fn operation_name(op: &Operation) -> &'static str {
    match op {
        Operation::Create => "CREATE",
        Operation::Update => "UPDATE",
        Operation::Delete => "DELETE",
        Operation::Connect => "CONNECT",
    }
}

fn json_response(rsp: AdmissionReview) -> Result<Response<Body>, Error> {
    let bytes = serde_json::to_vec(&rsp)?;
    Ok(Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("admission review response must be valid"))
}

fn parse_object<T: DeserializeOwned>(req: AdmissionRequest) -> Result<(DynamicObject, T)> {
    let obj = req
        .object
        .ok_or_else(|| anyhow!("admission request missing 'object'"))?;
    let typed = serde_json::from_value(serde_json::to_value(&obj)?)?;
    Ok((obj, typed))
}

#[async_trait::async_trait]
impl<L> Validate<Configuration> for Admission<L>
where
    L: Lister + Clone + 'static,
{
    /// Checks that the module source is permitted and that a single security
    /// policy applies.
    async fn validate(
        self,
        ns: &str,
        _name: &str,
        config: Configuration,
    ) -> Result<()> {
        let policies = self.list("policies", self.lister.policies()).await?;

        let module = config.spec.module.as_str();
        modules::is_permitted(module, &policies)?.into_result(module)?;

        let namespace = self
            .list("namespaces", self.lister.namespace(ns))
            .await?
            .ok_or_else(|| anyhow!("namespace {ns} not found"))?;
        resolve::resolve(&config, &namespace, &policies)?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl<L> Validate<Policy> for Admission<L>
where
    L: Lister + Clone + 'static,
{
    /// Checks that the policy's selectors and module patterns are well-formed.
    async fn validate(
        self,
        _ns: &str,
        name: &str,
        policy: Policy,
    ) -> Result<()> {
        if let Some(checkov) = policy.checkov() {
            for (scope, selector) in [
                ("namespace", checkov.namespace_selector()),
                ("resource", checkov.resource_selector()),
            ] {
                if let Some(selector) = selector {
                    selector
                        .validate()
                        .map_err(|error| PolicyError::SelectorEvaluation {
                            policy: name.to_string(),
                            scope,
                            error,
                        })?;
                }
            }
        }

        modules::validate(&policy)?;
        Ok(())
    }
}
