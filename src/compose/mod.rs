mod descriptor;
mod instance;
mod scaffold;

pub use descriptor::{service_name, AddOns, ComposeFile, Service, MAP_SERVER_IMAGE, WATCHTOWER_IMAGE};
pub use instance::{
    non_empty, ComposeError, Credentials, InstanceComposer, InstanceSpec, PortPolicy, BASE_PORT,
    DEFAULT_PORT_POLICY, MAX_INSTANCES, PORT_RANGE,
};
pub use scaffold::{running_as_root, scaffold, Ownership, CONTAINER_GID, CONTAINER_UID};
