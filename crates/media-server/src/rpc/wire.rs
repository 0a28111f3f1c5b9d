//! JSON wire format
//!
//! Requests are `{"method": "<name>", "params": {...}}` with camelCase names;
//! `getVersion` takes no `params`. Responses are either `{"result": ...}` or
//! `{"error": {"code": n, "exception": "<Name>", "message": "..."}}`.

use mediagraph_object_core::{MediaObjectRef, MixerType, SdpEndpointType, SignalHandle, SignalKind};
use serde::{Deserialize, Serialize};

/// One RPC call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum RpcRequest {
    #[serde(rename_all = "camelCase")]
    CreateMediaManager { garbage_period: i64 },

    #[serde(rename_all = "camelCase")]
    CreateMixer {
        parent: MediaObjectRef,
        mixer_type: MixerType,
    },

    #[serde(rename = "createSdpEndPoint", rename_all = "camelCase")]
    CreateSdpEndpoint {
        parent: MediaObjectRef,
        sdp_endpoint_type: SdpEndpointType,
    },

    #[serde(rename = "createSdpEndPointWithFixedSdp", rename_all = "camelCase")]
    CreateSdpEndpointWithFixedSdp {
        parent: MediaObjectRef,
        sdp_endpoint_type: SdpEndpointType,
        fixed_sdp: String,
    },

    #[serde(rename = "createPlayerEndPoint", rename_all = "camelCase")]
    CreatePlayerEndpoint {
        parent: MediaObjectRef,
        uri: String,
        #[serde(default)]
        use_encoded_media: bool,
    },

    #[serde(rename = "createRecorderEndPoint", rename_all = "camelCase")]
    CreateRecorderEndpoint { parent: MediaObjectRef, uri: String },

    GenerateOffer { endpoint: MediaObjectRef },

    #[serde(rename_all = "camelCase")]
    ProcessOffer {
        endpoint: MediaObjectRef,
        remote_sdp: String,
    },

    #[serde(rename_all = "camelCase")]
    ProcessAnswer {
        endpoint: MediaObjectRef,
        answer_sdp: String,
    },

    GetLocalSessionDescriptor { endpoint: MediaObjectRef },

    GetRemoteSessionDescriptor { endpoint: MediaObjectRef },

    Play { endpoint: MediaObjectRef },

    Record { endpoint: MediaObjectRef },

    Stop { endpoint: MediaObjectRef },

    GetParent { object: MediaObjectRef },

    Release { object: MediaObjectRef },

    Subscribe {
        object: MediaObjectRef,
        kind: SignalKind,
    },

    Unsubscribe {
        object: MediaObjectRef,
        handle: SignalHandle,
    },

    PollEvents {
        object: MediaObjectRef,
        handle: SignalHandle,
    },

    GetVersion,
}

impl RpcRequest {
    /// Wire name of the method
    pub fn method(&self) -> &'static str {
        match self {
            RpcRequest::CreateMediaManager { .. } => "createMediaManager",
            RpcRequest::CreateMixer { .. } => "createMixer",
            RpcRequest::CreateSdpEndpoint { .. } => "createSdpEndPoint",
            RpcRequest::CreateSdpEndpointWithFixedSdp { .. } => "createSdpEndPointWithFixedSdp",
            RpcRequest::CreatePlayerEndpoint { .. } => "createPlayerEndPoint",
            RpcRequest::CreateRecorderEndpoint { .. } => "createRecorderEndPoint",
            RpcRequest::GenerateOffer { .. } => "generateOffer",
            RpcRequest::ProcessOffer { .. } => "processOffer",
            RpcRequest::ProcessAnswer { .. } => "processAnswer",
            RpcRequest::GetLocalSessionDescriptor { .. } => "getLocalSessionDescriptor",
            RpcRequest::GetRemoteSessionDescriptor { .. } => "getRemoteSessionDescriptor",
            RpcRequest::Play { .. } => "play",
            RpcRequest::Record { .. } => "record",
            RpcRequest::Stop { .. } => "stop",
            RpcRequest::GetParent { .. } => "getParent",
            RpcRequest::Release { .. } => "release",
            RpcRequest::Subscribe { .. } => "subscribe",
            RpcRequest::Unsubscribe { .. } => "unsubscribe",
            RpcRequest::PollEvents { .. } => "pollEvents",
            RpcRequest::GetVersion => "getVersion",
        }
    }
}

/// Error body of a failed call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorBody {
    pub code: i32,
    pub exception: String,
    pub message: String,
}

/// Reply to one RPC call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RpcResponse {
    Result(serde_json::Value),
    Error(RpcErrorBody),
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediagraph_object_core::{ObjectId, Token};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_create_sdp_endpoint() {
        let request: RpcRequest = serde_json::from_value(json!({
            "method": "createSdpEndPoint",
            "params": {
                "parent": {"id": 5, "token": 5},
                "sdpEndpointType": "WEBRTC_END_POINT"
            }
        }))
        .unwrap();

        assert_eq!(
            request,
            RpcRequest::CreateSdpEndpoint {
                parent: MediaObjectRef::new(ObjectId(5), Token(5)),
                sdp_endpoint_type: SdpEndpointType::WebRtc,
            }
        );
        assert_eq!(request.method(), "createSdpEndPoint");
    }

    #[test]
    fn test_parse_get_version_without_params() {
        let request: RpcRequest = serde_json::from_value(json!({"method": "getVersion"})).unwrap();
        assert_eq!(request, RpcRequest::GetVersion);
    }

    #[test]
    fn test_player_defaults_to_decoded_media() {
        let request: RpcRequest = serde_json::from_value(json!({
            "method": "createPlayerEndPoint",
            "params": {"parent": {"id": 1, "token": 1}, "uri": "file:///a"}
        }))
        .unwrap();
        assert!(matches!(
            request,
            RpcRequest::CreatePlayerEndpoint { use_encoded_media: false, .. }
        ));
    }

    #[test]
    fn test_unknown_method_is_rejected() {
        let result = serde_json::from_value::<RpcRequest>(json!({"method": "connect", "params": {}}));
        assert!(result.is_err());
    }

    #[test]
    fn test_response_envelope() {
        let ok = serde_json::to_value(RpcResponse::Result(json!(1))).unwrap();
        assert_eq!(ok, json!({"result": 1}));

        let err = serde_json::to_value(RpcResponse::Error(RpcErrorBody {
            code: 2,
            exception: "NoParentException".into(),
            message: "Media object 3 has no parent".into(),
        }))
        .unwrap();
        assert_eq!(
            err,
            json!({"error": {"code": 2, "exception": "NoParentException", "message": "Media object 3 has no parent"}})
        );
    }
}
