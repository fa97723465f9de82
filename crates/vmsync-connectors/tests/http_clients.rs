//! Integration tests for the vCenter and RackTables clients using wiremock.

use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use wiremock::matchers::{basic_auth, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vmsync_connectors::{
    Cmdb, ConnectorError, Hypervisor, MutationOutcome, PowerState, RackTablesClient,
    RackTablesCmdb, VCenterClient,
};
use vmsync_types::{ClusterId, ObjectId, VmId};

// =============================================================================
// Test Helpers
// =============================================================================

fn racktables(server: &MockServer) -> RackTablesCmdb {
    let client = RackTablesClient::new(
        &format!("{}/api.php", server.uri()),
        "rtuser",
        "rtpass",
        Duration::from_secs(5),
    )
    .unwrap();
    RackTablesCmdb::new(client)
}

async fn mount_session(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/session"))
        .and(basic_auth("vmwuser", "vmwpass"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!("session-token")))
        .mount(server)
        .await;
}

async fn vcenter(server: &MockServer) -> VCenterClient {
    mount_session(server).await;
    VCenterClient::connect(&server.uri(), "vmwuser", "vmwpass", Duration::from_secs(5))
        .await
        .unwrap()
}

// =============================================================================
// vCenter
// =============================================================================

#[tokio::test]
async fn test_vcenter_rejected_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/session"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result =
        VCenterClient::connect(&server.uri(), "vmwuser", "wrong", Duration::from_secs(5)).await;
    match result {
        Err(err) => assert!(err.is_connection(), "unexpected error: {}", err),
        Ok(_) => panic!("connect should fail"),
    }
}

#[tokio::test]
async fn test_vcenter_get_vm_assembles_detail() {
    let server = MockServer::start().await;
    let client = vcenter(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/vcenter/vm/vm-42"))
        .and(header("vmware-api-session-id", "session-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "web01",
            "guest_OS": "RHEL_6_64",
            "power_state": "POWERED_ON",
            "cpu": { "count": 4, "cores_per_socket": 1 },
            "disks": {
                "2000": { "label": "Hard disk 1", "backing": { "type": "VMDK_FILE", "vmdk_file": "[ds1] web01/web01.vmdk" } }
            }
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/vcenter/vm/vm-42/guest/identity"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "host_name": "web01.example.com",
            "name": "RHEL_6_64",
            "family": "LINUX"
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/vcenter/vm/vm-42/guest/networking/interfaces"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "mac_address": "00:50:56:aa:bb:01",
                "nic": "4000",
                "ip": { "ip_addresses": [
                    { "ip_address": "10.0.0.1", "prefix_length": 24, "state": "PREFERRED" },
                    { "ip_address": "fe80::250:56ff:feaa:bb01", "prefix_length": 64, "state": "UNKNOWN" }
                ] }
            },
            { "mac_address": "02:42:ac:11:00:01", "ip": { "ip_addresses": [] } }
        ])))
        .mount(&server)
        .await;

    let vm = client.get_vm(&VmId::new("vm-42")).await.unwrap();
    assert_eq!(vm.name, "web01");
    assert_eq!(vm.hostname.as_deref(), Some("web01.example.com"));
    assert_eq!(vm.guest_os.as_deref(), Some("RHEL_6_64"));
    assert_eq!(vm.cpu_count, Some(4));
    assert_eq!(vm.disk_backing.as_deref(), Some("[ds1] web01/web01.vmdk"));
    assert_eq!(vm.power_state, PowerState::PoweredOn);
    assert_eq!(vm.nics.len(), 2);
    assert_eq!(vm.nics[0].device_key.as_deref(), Some("4000"));
    assert_eq!(vm.nics[1].device_key, None);
}

#[tokio::test]
async fn test_vcenter_guest_data_unavailable_is_not_an_error() {
    let server = MockServer::start().await;
    let client = vcenter(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/vcenter/vm/vm-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "legacy-box",
            "guest_OS": "OTHER_LINUX_64",
            "power_state": "POWERED_OFF",
            "cpu": { "count": 1 }
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/vcenter/vm/vm-7/guest/identity"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/vcenter/vm/vm-7/guest/networking/interfaces"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let vm = client.get_vm(&VmId::new("vm-7")).await.unwrap();
    assert_eq!(vm.hostname, None);
    assert!(vm.nics.is_empty());
    assert_eq!(vm.disk_backing, None);
    assert_eq!(vm.power_state, PowerState::PoweredOff);
}

#[tokio::test]
async fn test_vcenter_vm_detail_server_error_propagates() {
    let server = MockServer::start().await;
    let client = vcenter(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/vcenter/vm/vm-9"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = client.get_vm(&VmId::new("vm-9")).await.unwrap_err();
    assert!(matches!(err, ConnectorError::Api { status: 500, .. }));
}

#[tokio::test]
async fn test_vcenter_cluster_listing() {
    let server = MockServer::start().await;
    let client = vcenter(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/vcenter/cluster"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "cluster": "domain-c7", "name": "SYD2 Prod AMD", "ha_enabled": true, "drs_enabled": true }
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/vcenter/vm"))
        .and(query_param("clusters", "domain-c7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "vm": "vm-1", "name": "web01", "power_state": "POWERED_ON" },
            { "vm": "vm-2", "name": "web02", "power_state": "POWERED_OFF" }
        ])))
        .mount(&server)
        .await;

    let clusters = client.list_clusters().await.unwrap();
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0].name, "SYD2 Prod AMD");

    let vms = client
        .list_cluster_vms(&ClusterId::new("domain-c7"))
        .await
        .unwrap();
    assert_eq!(vms, vec![VmId::new("vm-1"), VmId::new("vm-2")]);
}

// =============================================================================
// RackTables
// =============================================================================

#[tokio::test]
async fn test_racktables_list_objects() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api.php"))
        .and(query_param("method", "get_objects"))
        .and(query_param("type_filter", "1504"))
        .and(basic_auth("rtuser", "rtpass"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": {
                "12": { "id": "12", "name": "web01", "container_name": "SYD2 Prod AMD" }
            }
        })))
        .mount(&server)
        .await;

    let objects = racktables(&server).list_objects(1504).await.unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].id, ObjectId::new(12));
    assert_eq!(objects[0].container_name.as_deref(), Some("SYD2 Prod AMD"));
}

#[tokio::test]
async fn test_racktables_redirect_after_create_is_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api.php"))
        .and(query_param("method", "add_object"))
        .and(query_param("object_name", "web01"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", "/index.php?page=object&object_id=12"),
        )
        .mount(&server)
        .await;

    let outcome = racktables(&server).create_object("web01", 1504).await;
    assert_eq!(outcome, MutationOutcome::Success);
}

#[tokio::test]
async fn test_racktables_duplicate_create_is_already_exists() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api.php"))
        .and(query_param("method", "add_object"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_json(json!({ "error": "Duplicate entry 'web01' for key 'name'" })),
        )
        .mount(&server)
        .await;

    let outcome = racktables(&server).create_object("web01", 1504).await;
    assert_eq!(outcome, MutationOutcome::AlreadyExists);
}

#[tokio::test]
async fn test_racktables_edit_sends_numbered_attributes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api.php"))
        .and(query_param("method", "edit_object"))
        .and(query_param("object_id", "12"))
        .and(query_param("attr_3", "web01"))
        .and(query_param("attr_10018", "4"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&server)
        .await;

    let attrs = BTreeMap::from([(3, "web01".to_string()), (10018, "4".to_string())]);
    let outcome = racktables(&server)
        .edit_object(ObjectId::new(12), "web01", 1504, &attrs)
        .await;
    assert_eq!(outcome, MutationOutcome::Success);
}

#[tokio::test]
async fn test_racktables_delete_missing_object_is_already_absent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api.php"))
        .and(query_param("method", "delete_object"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": "object not found" })))
        .mount(&server)
        .await;

    let outcome = racktables(&server).delete_object(ObjectId::new(99)).await;
    assert_eq!(outcome, MutationOutcome::AlreadyAbsent);
}

#[tokio::test]
async fn test_racktables_unlink_sends_both_entities() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api.php"))
        .and(query_param("method", "unlink_entities"))
        .and(query_param("child_entity_id", "12"))
        .and(query_param("parent_entity_id", "7"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", "/index.php?page=object&object_id=12"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let outcome = racktables(&server)
        .unlink_entities(ObjectId::new(12), ObjectId::new(7))
        .await;
    assert_eq!(outcome, MutationOutcome::Success);
}

#[tokio::test]
async fn test_racktables_read_auth_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api.php"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = racktables(&server).get_chapter(13).await.unwrap_err();
    assert!(err.is_connection());
}
