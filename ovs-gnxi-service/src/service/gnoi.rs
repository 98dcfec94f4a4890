//! gNOI RPC surface: System (Reboot) and Certificate Management
//! (GetCertificates). The remaining operations are placeholders.

use std::pin::Pin;

use futures::stream::Stream;
use gnxi_proto::gnoi::certificate::certificate_management_server::CertificateManagement;
use gnxi_proto::gnoi::certificate::{
    CanGenerateCsrRequest, CanGenerateCsrResponse, GetCertificatesRequest,
    GetCertificatesResponse, InstallCertificateRequest, InstallCertificateResponse,
    RevokeCertificatesRequest, RevokeCertificatesResponse, RotateCertificateRequest,
    RotateCertificateResponse,
};
use gnxi_proto::gnoi::system::system_server::System;
use gnxi_proto::gnoi::system::{
    CancelRebootRequest, CancelRebootResponse, PingRequest, PingResponse, RebootRequest,
    RebootResponse, RebootStatusRequest, RebootStatusResponse, SetPackageRequest,
    SetPackageResponse, SwitchControlProcessorRequest, SwitchControlProcessorResponse,
    TimeRequest, TimeResponse, TracerouteRequest, TracerouteResponse,
};
use tonic::{Request, Response, Status, Streaming};
use tracing::info;

use super::Service;

type ServerStream<T> =
    Pin<Box<dyn Stream<Item = std::result::Result<T, Status>> + Send + 'static>>;

#[tonic::async_trait]
impl System for Service {
    /// Dispatches the reboot callback asynchronously; the physical reboot
    /// happens out of band.
    async fn reboot(
        &self,
        request: Request<RebootRequest>,
    ) -> std::result::Result<Response<RebootResponse>, Status> {
        self.authorize(request.metadata(), "Reboot")?;

        let _guard = self.config.write().await;
        self.dispatch_reboot();
        info!("Send Reboot response to client");

        Ok(Response::new(RebootResponse {}))
    }

    async fn reboot_status(
        &self,
        _request: Request<RebootStatusRequest>,
    ) -> std::result::Result<Response<RebootStatusResponse>, Status> {
        Err(Status::unimplemented("RebootStatus is not implemented."))
    }

    async fn cancel_reboot(
        &self,
        _request: Request<CancelRebootRequest>,
    ) -> std::result::Result<Response<CancelRebootResponse>, Status> {
        Err(Status::unimplemented("CancelReboot is not implemented."))
    }

    type PingStream = ServerStream<PingResponse>;

    async fn ping(
        &self,
        _request: Request<PingRequest>,
    ) -> std::result::Result<Response<Self::PingStream>, Status> {
        Err(Status::unimplemented("Ping is not implemented."))
    }

    type TracerouteStream = ServerStream<TracerouteResponse>;

    async fn traceroute(
        &self,
        _request: Request<TracerouteRequest>,
    ) -> std::result::Result<Response<Self::TracerouteStream>, Status> {
        Err(Status::unimplemented("Traceroute is not implemented."))
    }

    async fn time(
        &self,
        _request: Request<TimeRequest>,
    ) -> std::result::Result<Response<TimeResponse>, Status> {
        Err(Status::unimplemented("Time is not implemented."))
    }

    async fn set_package(
        &self,
        _request: Request<Streaming<SetPackageRequest>>,
    ) -> std::result::Result<Response<SetPackageResponse>, Status> {
        Err(Status::unimplemented("SetPackage is not implemented."))
    }

    async fn switch_control_processor(
        &self,
        _request: Request<SwitchControlProcessorRequest>,
    ) -> std::result::Result<Response<SwitchControlProcessorResponse>, Status> {
        Err(Status::unimplemented("SwitchControlProcessor is not implemented."))
    }
}

#[tonic::async_trait]
impl CertificateManagement for Service {
    type RotateStream = ServerStream<RotateCertificateResponse>;

    async fn rotate(
        &self,
        request: Request<Streaming<RotateCertificateRequest>>,
    ) -> std::result::Result<Response<Self::RotateStream>, Status> {
        self.authorize(request.metadata(), "Rotate")?;
        Err(Status::unimplemented("Rotate is not implemented."))
    }

    type InstallStream = ServerStream<InstallCertificateResponse>;

    async fn install(
        &self,
        _request: Request<Streaming<InstallCertificateRequest>>,
    ) -> std::result::Result<Response<Self::InstallStream>, Status> {
        Err(Status::unimplemented("Install is not implemented."))
    }

    /// Returns the active package's certificate info.
    async fn get_certificates(
        &self,
        request: Request<GetCertificatesRequest>,
    ) -> std::result::Result<Response<GetCertificatesResponse>, Status> {
        self.authorize(request.metadata(), "GetCertificates")?;

        Ok(Response::new(GetCertificatesResponse {
            certificate_info: self.active_cert_info(),
        }))
    }

    async fn revoke_certificates(
        &self,
        _request: Request<RevokeCertificatesRequest>,
    ) -> std::result::Result<Response<RevokeCertificatesResponse>, Status> {
        Err(Status::unimplemented("RevokeCertificates is not implemented."))
    }

    async fn can_generate_csr(
        &self,
        _request: Request<CanGenerateCsrRequest>,
    ) -> std::result::Result<Response<CanGenerateCsrResponse>, Status> {
        Err(Status::unimplemented("CanGenerateCSR is not implemented."))
    }
}
