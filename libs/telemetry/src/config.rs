#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryProtocol {
    Grpc,
    HttpProtobuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    pub endpoint: String,
    pub protocol: TelemetryProtocol,
    pub json_logs: bool,
    pub enabled: bool,
}

impl TelemetryConfig {
    pub fn from_env(default_service_name: &str, default_service_version: &str) -> Self {
        Self::from_lookup(default_service_name, default_service_version, |key| {
            std::env::var(key).ok()
        })
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(
        default_service_name: &str,
        default_service_version: &str,
        lookup: F,
    ) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = lookup("OTEL_EXPORTER_OTLP_ENDPOINT").unwrap_or_default();
        let protocol = match lookup("OTEL_EXPORTER_OTLP_PROTOCOL")
            .map(|v| v.to_ascii_lowercase())
            .as_deref()
        {
            Some("http") | Some("http/protobuf") => TelemetryProtocol::HttpProtobuf,
            _ => TelemetryProtocol::Grpc,
        };
        let service_name =
            lookup("OTEL_SERVICE_NAME").unwrap_or_else(|| default_service_name.to_string());
        let service_version =
            lookup("OTEL_SERVICE_VERSION").unwrap_or_else(|| default_service_version.to_string());
        // text unless LOG_FORMAT=json
        let json_logs = lookup("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let enabled = lookup("ENABLE_OTEL")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);

        Self {
            service_name,
            service_version,
            endpoint,
            protocol,
            json_logs,
            enabled,
        }
    }

    pub fn exporter_enabled(&self) -> bool {
        self.enabled && !self.endpoint.trim().is_empty()
    }
}
