//! Pagination driver: runs a list operation page by page until the
//! service stops returning a next-page token.

use std::future::Future;

use crate::context::OperationContext;
use crate::error::DispatchFault;
use crate::sdk::{PaginatedRequest, PaginatedResponse};

/// Every page collected for one list request, in dispatch order, plus the
/// fault that stopped iteration early, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct ListResponses<P> {
    pub responses: Vec<P>,
    pub fault: Option<DispatchFault>,
}

impl<P> ListResponses<P> {
    pub fn is_complete(&self) -> bool {
        self.fault.is_none()
    }
}

/// Drive `dispatch` over successive pages of `request`.
///
/// `request` is advanced in place: after each page that carries a
/// non-empty next-page token, its page cursor is set to that token. There
/// is no internal page cap; an endless chain is bounded by the runner's
/// per-operation timeout, which cancels `ctx`.
pub async fn generate_list_responses<R, P, F, Fut>(
    request: &mut R,
    ctx: &OperationContext,
    mut dispatch: F,
) -> ListResponses<P>
where
    R: PaginatedRequest,
    P: PaginatedResponse,
    F: FnMut(R) -> Fut,
    Fut: Future<Output = Result<P, DispatchFault>>,
{
    let mut responses = Vec::new();
    loop {
        if ctx.is_cancelled() {
            return ListResponses {
                responses,
                fault: Some(DispatchFault::Cancelled),
            };
        }
        let page = request.page().map(str::to_string);
        match ctx.guard(dispatch(request.clone())).await {
            Ok(response) => {
                let next = response
                    .next_page()
                    .filter(|token| !token.is_empty())
                    .map(str::to_string);
                responses.push(response);
                tracing::debug!(page = ?page, next = ?next, collected = responses.len(), "list page");
                match next {
                    Some(token) => request.set_page(Some(token)),
                    None => {
                        return ListResponses {
                            responses,
                            fault: None,
                        }
                    }
                }
            }
            Err(fault) => {
                tracing::debug!(page = ?page, collected = responses.len(), %fault, "list stopped on fault");
                return ListResponses {
                    responses,
                    fault: Some(fault),
                };
            }
        }
    }
}
