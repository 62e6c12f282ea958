//! Two-tier VPC provisioning.
//!
//! Declares the virtual network every cluster scenario is placed in: a VPC
//! with a configurable subnet plan replicated across availability zones.
//! The default plan pairs one public and one private-with-egress tier across
//! two AZs, which is what most lab scenarios expect; one scenario overrides
//! the plan with deliberately tiny /27 subnets to provoke IP exhaustion.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::graph::{DependencyKind, ResourceGraph, ResourceRef};

/// Subnet tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubnetKind {
    /// Routed to an internet gateway, public IPs on launch
    Public,
    /// Routed to a NAT gateway for outbound-only connectivity
    PrivateWithEgress,
}

/// One entry in the subnet plan. Each entry is replicated once per AZ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubnetPlanEntry {
    /// Tier name, e.g. `public`
    pub name: String,
    /// Tier kind
    pub kind: SubnetKind,
    /// Subnet prefix length; defaults to /24
    #[serde(default)]
    pub cidr_mask: Option<u8>,
}

impl SubnetPlanEntry {
    /// A plan entry with the default prefix length.
    pub fn new(name: impl Into<String>, kind: SubnetKind) -> Self {
        Self {
            name: name.into(),
            kind,
            cidr_mask: None,
        }
    }

    /// Override the subnet prefix length.
    pub fn with_cidr_mask(mut self, mask: u8) -> Self {
        self.cidr_mask = Some(mask);
        self
    }
}

const DEFAULT_SUBNET_MASK: u8 = 24;

/// Network configuration for one deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Number of availability zones to spread subnets across
    pub max_azs: usize,
    /// VPC CIDR block
    pub cidr: String,
    /// Subnet plan, replicated per AZ
    pub subnet_plan: Vec<SubnetPlanEntry>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_azs: 2,
            cidr: "10.0.0.0/16".to_string(),
            subnet_plan: vec![
                SubnetPlanEntry::new("public", SubnetKind::Public),
                SubnetPlanEntry::new("private", SubnetKind::PrivateWithEgress),
            ],
        }
    }
}

/// A declared subnet.
#[derive(Debug, Clone)]
pub struct SubnetHandle {
    /// The graph resource backing this subnet
    pub resource: ResourceRef,
    /// Plan entry name this subnet came from
    pub name: String,
    /// AZ index (0-based) within the deployment
    pub az_index: usize,
    /// Tier kind
    pub kind: SubnetKind,
    /// Assigned CIDR block
    pub cidr: String,
}

/// The provisioned network. Read-only after creation; shared by reference
/// with every construct that needs placement.
#[derive(Debug, Clone)]
pub struct NetworkHandle {
    /// The VPC resource
    pub vpc: ResourceRef,
    /// VPC CIDR block
    pub cidr: String,
    /// Number of AZs the plan was replicated across
    pub az_count: usize,
    /// Public-tier subnets, ordered by plan entry then AZ
    pub public_subnets: Vec<SubnetHandle>,
    /// Private-tier subnets, ordered by plan entry then AZ
    pub private_subnets: Vec<SubnetHandle>,
}

impl NetworkHandle {
    /// Subnets of the given tier.
    pub fn subnets(&self, kind: SubnetKind) -> &[SubnetHandle] {
        match kind {
            SubnetKind::Public => &self.public_subnets,
            SubnetKind::PrivateWithEgress => &self.private_subnets,
        }
    }

    /// `Ref` intrinsics for the subnets of the given tier.
    pub fn subnet_ids(&self, kind: SubnetKind) -> Vec<Value> {
        self.subnets(kind).iter().map(|s| s.resource.reference()).collect()
    }

    /// Total number of declared subnets.
    pub fn subnet_count(&self) -> usize {
        self.public_subnets.len() + self.private_subnets.len()
    }
}

/// Declares VPCs and their subnet layouts into a resource graph.
pub struct NetworkProvisioner;

impl NetworkProvisioner {
    /// Provision a network under the given logical-id prefix.
    ///
    /// Produces exactly `max_azs x |subnet_plan|` subnets. Address
    /// exhaustion inside the VPC CIDR is surfaced as
    /// [`Error::ResourceQuotaExceeded`] and never retried here; anything the
    /// external engine would reject later is its own validation to make.
    pub fn provision(
        graph: &mut ResourceGraph,
        prefix: &str,
        config: &NetworkConfig,
    ) -> Result<NetworkHandle> {
        config.validate()?;

        let (base, vpc_mask) = parse_cidr(&config.cidr)?;

        let vpc = graph.declare(
            format!("{prefix}Vpc"),
            "AWS::EC2::VPC",
            json!({
                "CidrBlock": config.cidr,
                "EnableDnsHostnames": true,
                "EnableDnsSupport": true,
                "Tags": [{ "Key": "Name", "Value": prefix }],
            }),
        )?;

        let igw = graph.declare(
            format!("{prefix}Igw"),
            "AWS::EC2::InternetGateway",
            json!({}),
        )?;
        let attachment_id = format!("{prefix}IgwAttachment");
        graph.declare(
            &attachment_id,
            "AWS::EC2::VPCGatewayAttachment",
            json!({
                "VpcId": vpc.reference(),
                "InternetGatewayId": igw.reference(),
            }),
        )?;
        graph.add_dependency(&attachment_id, &vpc.logical_id, DependencyKind::Reference)?;
        graph.add_dependency(&attachment_id, &igw.logical_id, DependencyKind::Reference)?;

        let mut allocator = CidrAllocator::new(base, vpc_mask);
        let mut public_subnets = Vec::new();
        let mut private_subnets = Vec::new();

        for entry in &config.subnet_plan {
            let mask = entry.cidr_mask.unwrap_or(DEFAULT_SUBNET_MASK);
            for az in 0..config.max_azs {
                let subnet_cidr = allocator.next_block(mask).ok_or_else(|| {
                    Error::ResourceQuotaExceeded(format!(
                        "subnet plan does not fit in VPC CIDR {}: tier '{}' az {} needs a /{mask}",
                        config.cidr, entry.name, az
                    ))
                })?;
                let logical_id =
                    format!("{prefix}{}Subnet{}", capitalize(&entry.name), az + 1);
                let resource = graph.declare(
                    &logical_id,
                    "AWS::EC2::Subnet",
                    json!({
                        "VpcId": vpc.reference(),
                        "CidrBlock": subnet_cidr,
                        "AvailabilityZone": { "Fn::Select": [az, { "Fn::GetAZs": "" }] },
                        "MapPublicIpOnLaunch": matches!(entry.kind, SubnetKind::Public),
                        "Tags": [{ "Key": "Name", "Value": format!("{prefix}/{}-{}", entry.name, az + 1) }],
                    }),
                )?;
                graph.add_dependency(&logical_id, &vpc.logical_id, DependencyKind::Reference)?;

                let handle = SubnetHandle {
                    resource,
                    name: entry.name.clone(),
                    az_index: az,
                    kind: entry.kind,
                    cidr: subnet_cidr,
                };
                match entry.kind {
                    SubnetKind::Public => public_subnets.push(handle),
                    SubnetKind::PrivateWithEgress => private_subnets.push(handle),
                }
            }
        }

        Self::declare_routing(
            graph,
            prefix,
            &vpc,
            &attachment_id,
            &public_subnets,
            &private_subnets,
            config.max_azs,
        )?;

        tracing::info!(
            vpc = %vpc.logical_id,
            subnets = public_subnets.len() + private_subnets.len(),
            azs = config.max_azs,
            "provisioned network"
        );

        Ok(NetworkHandle {
            vpc,
            cidr: config.cidr.clone(),
            az_count: config.max_azs,
            public_subnets,
            private_subnets,
        })
    }

    /// Public subnets share one route table pointed at the internet gateway;
    /// each AZ with private subnets gets a NAT gateway and its own table.
    fn declare_routing(
        graph: &mut ResourceGraph,
        prefix: &str,
        vpc: &ResourceRef,
        igw_attachment: &str,
        public_subnets: &[SubnetHandle],
        private_subnets: &[SubnetHandle],
        max_azs: usize,
    ) -> Result<()> {
        if !public_subnets.is_empty() {
            let rt = graph.declare(
                format!("{prefix}PublicRouteTable"),
                "AWS::EC2::RouteTable",
                json!({ "VpcId": vpc.reference() }),
            )?;
            let route_id = format!("{prefix}PublicDefaultRoute");
            graph.declare(
                &route_id,
                "AWS::EC2::Route",
                json!({
                    "RouteTableId": rt.reference(),
                    "DestinationCidrBlock": "0.0.0.0/0",
                    "GatewayId": { "Ref": format!("{prefix}Igw") },
                }),
            )?;
            graph.add_dependency(&route_id, igw_attachment, DependencyKind::Ordering)?;
            for subnet in public_subnets {
                let assoc_id = format!("{}RtAssoc", subnet.resource.logical_id);
                graph.declare(
                    &assoc_id,
                    "AWS::EC2::SubnetRouteTableAssociation",
                    json!({
                        "SubnetId": subnet.resource.reference(),
                        "RouteTableId": rt.reference(),
                    }),
                )?;
                graph.add_dependency(
                    &assoc_id,
                    &subnet.resource.logical_id,
                    DependencyKind::Reference,
                )?;
            }
        }

        if private_subnets.is_empty() {
            return Ok(());
        }

        for az in 0..max_azs {
            let Some(exit_subnet) = public_subnets.iter().find(|s| s.az_index == az) else {
                // Egress tiers need a public subnet in the same AZ to host
                // the NAT gateway.
                return Err(Error::Config(format!(
                    "private tier requires a paired public subnet in az {az}"
                )));
            };

            let eip = graph.declare(
                format!("{prefix}NatEip{}", az + 1),
                "AWS::EC2::EIP",
                json!({ "Domain": "vpc" }),
            )?;
            let nat_id = format!("{prefix}NatGateway{}", az + 1);
            let nat = graph.declare(
                &nat_id,
                "AWS::EC2::NatGateway",
                json!({
                    "SubnetId": exit_subnet.resource.reference(),
                    "AllocationId": eip.get_att("AllocationId"),
                }),
            )?;
            graph.add_dependency(&nat_id, &eip.logical_id, DependencyKind::Reference)?;
            graph.add_dependency(
                &nat_id,
                &exit_subnet.resource.logical_id,
                DependencyKind::Reference,
            )?;

            let rt = graph.declare(
                format!("{prefix}PrivateRouteTable{}", az + 1),
                "AWS::EC2::RouteTable",
                json!({ "VpcId": vpc.reference() }),
            )?;
            let route_id = format!("{prefix}PrivateDefaultRoute{}", az + 1);
            graph.declare(
                &route_id,
                "AWS::EC2::Route",
                json!({
                    "RouteTableId": rt.reference(),
                    "DestinationCidrBlock": "0.0.0.0/0",
                    "NatGatewayId": nat.reference(),
                }),
            )?;
            graph.add_dependency(&route_id, &nat.logical_id, DependencyKind::Reference)?;

            for subnet in private_subnets.iter().filter(|s| s.az_index == az) {
                let assoc_id = format!("{}RtAssoc", subnet.resource.logical_id);
                graph.declare(
                    &assoc_id,
                    "AWS::EC2::SubnetRouteTableAssociation",
                    json!({
                        "SubnetId": subnet.resource.reference(),
                        "RouteTableId": rt.reference(),
                    }),
                )?;
                graph.add_dependency(
                    &assoc_id,
                    &subnet.resource.logical_id,
                    DependencyKind::Reference,
                )?;
            }
        }
        Ok(())
    }
}

impl NetworkConfig {
    fn validate(&self) -> Result<()> {
        if self.max_azs == 0 {
            return Err(Error::Config("max_azs must be at least 1".to_string()));
        }
        if self.subnet_plan.is_empty() {
            return Err(Error::Config("subnet plan is empty".to_string()));
        }
        for entry in &self.subnet_plan {
            if let Some(mask) = entry.cidr_mask {
                if !(16..=28).contains(&mask) {
                    return Err(Error::Config(format!(
                        "subnet tier '{}' has cidr_mask /{mask}, expected /16..=/28",
                        entry.name
                    )));
                }
            }
        }
        Ok(())
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn parse_cidr(cidr: &str) -> Result<(u32, u8)> {
    let (addr, mask) = cidr
        .split_once('/')
        .ok_or_else(|| Error::Config(format!("invalid CIDR '{cidr}'")))?;
    let mask: u8 = mask
        .parse()
        .map_err(|_| Error::Config(format!("invalid CIDR prefix in '{cidr}'")))?;
    if mask > 28 {
        return Err(Error::Config(format!("VPC CIDR '{cidr}' is too small")));
    }
    let octets: Vec<u32> = addr
        .split('.')
        .map(|o| o.parse::<u32>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| Error::Config(format!("invalid CIDR address in '{cidr}'")))?;
    if octets.len() != 4 || octets.iter().any(|o| *o > 255) {
        return Err(Error::Config(format!("invalid CIDR address in '{cidr}'")));
    }
    let base = (octets[0] << 24) | (octets[1] << 16) | (octets[2] << 8) | octets[3];
    Ok((base, mask))
}

fn format_ipv4(addr: u32) -> String {
    format!(
        "{}.{}.{}.{}",
        addr >> 24,
        (addr >> 16) & 0xff,
        (addr >> 8) & 0xff,
        addr & 0xff
    )
}

/// Sequentially carves fixed-size blocks out of a parent CIDR.
struct CidrAllocator {
    end: u64,
    cursor: u64,
}

impl CidrAllocator {
    fn new(base: u32, vpc_mask: u8) -> Self {
        let size = 1u64 << (32 - vpc_mask);
        Self {
            end: u64::from(base) + size,
            cursor: u64::from(base),
        }
    }

    fn next_block(&mut self, mask: u8) -> Option<String> {
        let size = 1u64 << (32 - mask);
        // Align the cursor to the block size.
        let start = self.cursor.div_ceil(size) * size;
        if start + size > self.end {
            return None;
        }
        self.cursor = start + size;
        Some(format!("{}/{}", format_ipv4(start as u32), mask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_plan_yields_paired_tiers_per_az() {
        let mut graph = ResourceGraph::new();
        let network =
            NetworkProvisioner::provision(&mut graph, "Lab", &NetworkConfig::default()).unwrap();

        assert_eq!(network.az_count, 2);
        assert_eq!(network.public_subnets.len(), 2);
        assert_eq!(network.private_subnets.len(), 2);
        for az in 0..2 {
            assert!(network.public_subnets.iter().any(|s| s.az_index == az));
            assert!(network.private_subnets.iter().any(|s| s.az_index == az));
        }
    }

    #[test]
    fn subnet_count_is_azs_times_plan_entries() {
        let mut graph = ResourceGraph::new();
        let config = NetworkConfig {
            max_azs: 3,
            subnet_plan: vec![
                SubnetPlanEntry::new("public", SubnetKind::Public),
                SubnetPlanEntry::new("private", SubnetKind::PrivateWithEgress),
            ],
            ..NetworkConfig::default()
        };
        let network = NetworkProvisioner::provision(&mut graph, "Lab", &config).unwrap();
        assert_eq!(network.subnet_count(), 6);
    }

    #[test]
    fn subnet_cidrs_do_not_overlap() {
        let mut graph = ResourceGraph::new();
        let network =
            NetworkProvisioner::provision(&mut graph, "Lab", &NetworkConfig::default()).unwrap();
        let mut cidrs: Vec<&str> = network
            .public_subnets
            .iter()
            .chain(&network.private_subnets)
            .map(|s| s.cidr.as_str())
            .collect();
        let total = cidrs.len();
        cidrs.sort();
        cidrs.dedup();
        assert_eq!(cidrs.len(), total);
    }

    #[test]
    fn exhausted_cidr_space_is_a_quota_error() {
        let mut graph = ResourceGraph::new();
        let config = NetworkConfig {
            max_azs: 2,
            cidr: "10.0.0.0/24".to_string(),
            subnet_plan: vec![
                SubnetPlanEntry::new("public", SubnetKind::Public).with_cidr_mask(25),
                SubnetPlanEntry::new("private", SubnetKind::PrivateWithEgress).with_cidr_mask(25),
            ],
        };
        let err = NetworkProvisioner::provision(&mut graph, "Lab", &config).unwrap_err();
        assert!(matches!(err, Error::ResourceQuotaExceeded(_)));
    }

    #[test]
    fn zero_azs_is_rejected() {
        let mut graph = ResourceGraph::new();
        let config = NetworkConfig {
            max_azs: 0,
            ..NetworkConfig::default()
        };
        let err = NetworkProvisioner::provision(&mut graph, "Lab", &config).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn narrow_masks_are_honored() {
        let mut graph = ResourceGraph::new();
        let config = NetworkConfig {
            max_azs: 2,
            cidr: "10.0.0.0/16".to_string(),
            subnet_plan: vec![
                SubnetPlanEntry::new("public", SubnetKind::Public).with_cidr_mask(27),
                SubnetPlanEntry::new("private", SubnetKind::PrivateWithEgress).with_cidr_mask(27),
            ],
        };
        let network = NetworkProvisioner::provision(&mut graph, "Lab", &config).unwrap();
        assert!(network
            .public_subnets
            .iter()
            .all(|s| s.cidr.ends_with("/27")));
    }
}
