//! RPC Method Handlers
//!
//! Thin translation between RPC types and the core services.

use crate::error::to_rpc_error;
use crate::types::{
    AvailabilityResponse, CallNextResponse, ClearResponse, JoinParams, LeaveParams,
    LeaveResponse, ListProfessorsParams, ListProfessorsResponse, ProfessorParams,
    ProfessorSummary, QueueParams, RegisterParams, StatsRequest, StatsResponse, StatusParams,
    StatusResponse,
};
use jsonrpsee::types::ErrorObjectOwned;
use queueup_core::application::{
    AvailabilityTracker, JoinReceipt, JoinRequest, QueueCoordinator, QueueSubscription,
    RegisterRequest,
};
use queueup_core::domain::{EntryStatus, Professor, QueueSnapshot};
use queueup_core::port::LedgerStore;
use std::sync::Arc;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    coordinator: Arc<QueueCoordinator>,
    tracker: Arc<AvailabilityTracker>,
    store: Arc<dyn LedgerStore>,
    start_time: std::time::Instant,
}

impl RpcHandler {
    pub fn new(
        coordinator: Arc<QueueCoordinator>,
        tracker: Arc<AvailabilityTracker>,
        store: Arc<dyn LedgerStore>,
    ) -> Self {
        Self {
            coordinator,
            tracker,
            store,
            start_time: std::time::Instant::now(),
        }
    }

    /// queue.join.v1
    pub async fn join(&self, params: JoinParams) -> Result<JoinReceipt, ErrorObjectOwned> {
        let req = JoinRequest {
            student_name: params.student_name,
            student_contact: params.student_contact,
        };
        self.coordinator
            .join(&params.professor_id, req)
            .await
            .map_err(to_rpc_error)
    }

    /// queue.leave.v1
    pub async fn leave(&self, params: LeaveParams) -> Result<LeaveResponse, ErrorObjectOwned> {
        let outcome = self
            .coordinator
            .leave(&params.entry_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(LeaveResponse {
            entry_id: params.entry_id,
            outcome,
        })
    }

    /// queue.call_next.v1
    pub async fn call_next(
        &self,
        params: QueueParams,
    ) -> Result<CallNextResponse, ErrorObjectOwned> {
        self.tracker
            .get(&params.professor_id)
            .await
            .map_err(to_rpc_error)?;

        let called = self
            .coordinator
            .call_next(&params.professor_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(CallNextResponse {
            professor_id: params.professor_id,
            called: called.map(Into::into),
        })
    }

    /// queue.clear.v1
    pub async fn clear(&self, params: QueueParams) -> Result<ClearResponse, ErrorObjectOwned> {
        self.tracker
            .get(&params.professor_id)
            .await
            .map_err(to_rpc_error)?;

        let removed = self
            .coordinator
            .clear_queue(&params.professor_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(ClearResponse {
            professor_id: params.professor_id,
            removed,
        })
    }

    /// queue.snapshot.v1
    pub async fn snapshot(&self, params: QueueParams) -> Result<QueueSnapshot, ErrorObjectOwned> {
        let snapshot = self
            .coordinator
            .snapshot(&params.professor_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(QueueSnapshot::clone(&snapshot))
    }

    /// queue.status.v1
    pub async fn status(&self, params: StatusParams) -> Result<StatusResponse, ErrorObjectOwned> {
        let status = self
            .coordinator
            .student_status(&params.entry_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(StatusResponse {
            entry_id: params.entry_id,
            status,
        })
    }

    /// queue.subscribe.v1
    pub async fn subscribe(
        &self,
        params: QueueParams,
    ) -> Result<QueueSubscription, ErrorObjectOwned> {
        self.coordinator
            .subscribe(&params.professor_id)
            .await
            .map_err(to_rpc_error)
    }

    /// professor.register.v1
    pub async fn register(&self, params: RegisterParams) -> Result<Professor, ErrorObjectOwned> {
        self.tracker
            .register(RegisterRequest {
                name: params.name,
                email: params.email,
                office: params.office,
            })
            .await
            .map_err(to_rpc_error)
    }

    /// professor.list.v1
    pub async fn list_professors(
        &self,
        _params: ListProfessorsParams,
    ) -> Result<ListProfessorsResponse, ErrorObjectOwned> {
        let listed = self.tracker.list_open().await.map_err(to_rpc_error)?;

        let mut professors = Vec::with_capacity(listed.len());
        for professor in listed {
            let queue_length = self
                .coordinator
                .snapshot(&professor.id)
                .await
                .map_err(to_rpc_error)?
                .len();
            professors.push(ProfessorSummary::new(professor, queue_length));
        }

        Ok(ListProfessorsResponse { professors })
    }

    /// professor.toggle.v1
    pub async fn toggle(
        &self,
        params: ProfessorParams,
    ) -> Result<AvailabilityResponse, ErrorObjectOwned> {
        let availability = self
            .tracker
            .toggle(&params.professor_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(AvailabilityResponse {
            professor_id: params.professor_id,
            availability,
        })
    }

    /// professor.end.v1
    pub async fn end(
        &self,
        params: ProfessorParams,
    ) -> Result<AvailabilityResponse, ErrorObjectOwned> {
        let availability = self
            .tracker
            .end_office_hours(&params.professor_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(AvailabilityResponse {
            professor_id: params.professor_id,
            availability,
        })
    }

    /// admin.stats.v1
    pub async fn stats(&self, _params: StatsRequest) -> Result<StatsResponse, ErrorObjectOwned> {
        let open_professors = self.tracker.list_open().await.map_err(to_rpc_error)?.len();

        let waiting_entries = self
            .store
            .count_by_status(EntryStatus::Waiting)
            .await
            .map_err(to_rpc_error)?;

        let called_entries = self
            .store
            .count_by_status(EntryStatus::Called)
            .await
            .map_err(to_rpc_error)?;

        Ok(StatsResponse {
            open_professors,
            waiting_entries,
            called_entries,
            uptime_seconds: self.start_time.elapsed().as_secs() as i64,
        })
    }
}
