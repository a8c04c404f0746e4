use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use ulid::Ulid;

use crate::{
    error::RouterError,
    query::{BindVars, Query, QueryResult, SafeSession, TabletType},
    router::Router,
    vindex::VCursor,
};

/// Per-statement scope: the cancellation signal, the in-progress bind-var
/// map, the session guard, and the router back-pointer through which vindex
/// callbacks issue routed statements of their own.
pub struct RequestContext<'a> {
    request_id: Ulid,
    token: CancellationToken,
    pub(crate) bind_vars: BindVars,
    tablet_type: TabletType,
    session: SafeSession,
    router: &'a Router,
}

impl<'a> RequestContext<'a> {
    pub(crate) fn new(router: &'a Router, token: CancellationToken, query: Query) -> Self {
        Self {
            request_id: Ulid::new(),
            token,
            bind_vars: query.bind_vars.unwrap_or_default(),
            tablet_type: query.tablet_type,
            session: SafeSession::new(query.session),
            router,
        }
    }

    pub fn request_id(&self) -> Ulid {
        self.request_id
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn tablet_type(&self) -> TabletType {
        self.tablet_type
    }

    pub(crate) fn session(&self) -> &SafeSession {
        &self.session
    }

    /// Every suspension point checks this before leaving the router.
    pub(crate) fn ensure_live(&self) -> Result<(), RouterError> {
        if self.token.is_cancelled() {
            return Err(RouterError::Cancelled);
        }
        Ok(())
    }
}

#[async_trait]
impl<'a> VCursor for RequestContext<'a> {
    async fn execute(&self, sql: &str, bind_vars: &BindVars) -> Result<QueryResult, RouterError> {
        self.ensure_live()?;
        let query = Query {
            sql: sql.to_owned(),
            bind_vars: Some(bind_vars.clone()),
            tablet_type: self.tablet_type,
            session: self.session.to_inner(),
        };
        self.router.execute(&self.token, query).await
    }
}
