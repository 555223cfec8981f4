//! Queue bridge to the external Lodestone lookup service. Submission is
//! non-blocking; responses are drained by the engine at the start of the next
//! reconciliation cycle, never awaited. The service side drains pending
//! requests and pushes responses out of band.

use std::collections::VecDeque;

use contracts::{LodestoneIdResponse, LodestoneRequest, LodestoneUpdateResponse};

#[derive(Debug, Default)]
pub struct LodestoneQueue {
    id_requests: VecDeque<LodestoneRequest>,
    update_requests: VecDeque<LodestoneRequest>,
    id_responses: VecDeque<LodestoneIdResponse>,
    update_responses: VecDeque<LodestoneUpdateResponse>,
}

impl LodestoneQueue {
    pub fn new() -> Self {
        Self::default()
    }

    // engine side

    pub fn add_id_request(&mut self, request: LodestoneRequest) {
        self.id_requests.push_back(request);
    }

    pub fn add_update_request(&mut self, request: LodestoneRequest) {
        self.update_requests.push_back(request);
    }

    pub fn get_verification_responses(&mut self) -> Vec<LodestoneIdResponse> {
        self.id_responses.drain(..).collect()
    }

    pub fn get_update_responses(&mut self) -> Vec<LodestoneUpdateResponse> {
        self.update_responses.drain(..).collect()
    }

    // service side

    pub fn drain_id_requests(&mut self) -> Vec<LodestoneRequest> {
        self.id_requests.drain(..).collect()
    }

    pub fn drain_update_requests(&mut self) -> Vec<LodestoneRequest> {
        self.update_requests.drain(..).collect()
    }

    pub fn push_id_response(&mut self, response: LodestoneIdResponse) {
        self.id_responses.push_back(response);
    }

    pub fn push_update_response(&mut self, response: LodestoneUpdateResponse) {
        self.update_responses.push_back(response);
    }

    pub fn pending_requests(&self) -> usize {
        self.id_requests.len() + self.update_requests.len()
    }

    pub fn pending_responses(&self) -> usize {
        self.id_responses.len() + self.update_responses.len()
    }
}
