//! VPC declaration: public/private subnet pairs per availability zone and a
//! shared outbound NAT path.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Result, SynthError};
use crate::stack::Stack;
use crate::template::{Expr, Resource};

pub const VPC_TYPE: &str = "AWS::EC2::VPC";
pub const SUBNET_TYPE: &str = "AWS::EC2::Subnet";
pub const NAT_GATEWAY_TYPE: &str = "AWS::EC2::NatGateway";

const ANYWHERE: &str = "0.0.0.0/0";
const SMALLEST_SUBNET_MASK: u32 = 28;
/// More zones than any region offers; keeps the subnet arithmetic in range.
const MAX_AZS: u32 = 16;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkDescriptor {
    pub max_azs: u32,
    pub nat_gateways: u32,
    pub cidr: String,
}

impl Default for NetworkDescriptor {
    fn default() -> Self {
        Self {
            max_azs: 3,
            nat_gateways: 1,
            cidr: "10.0.0.0/16".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubnetKind {
    Public,
    Private,
}

impl SubnetKind {
    fn label(self) -> &'static str {
        match self {
            Self::Public => "Public",
            Self::Private => "Private",
        }
    }

    fn elb_role_tag(self) -> &'static str {
        match self {
            Self::Public => "kubernetes.io/role/elb",
            Self::Private => "kubernetes.io/role/internal-elb",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetPlan {
    pub kind: SubnetKind,
    pub az_index: u32,
    pub cidr: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkHandle {
    pub vpc_id: Expr,
    pub public_subnet_ids: Vec<Expr>,
    pub private_subnet_ids: Vec<Expr>,
    pub nat_gateway_ids: Vec<String>,
}

impl NetworkHandle {
    pub fn all_subnet_ids(&self) -> Vec<Expr> {
        self.public_subnet_ids
            .iter()
            .chain(self.private_subnet_ids.iter())
            .cloned()
            .collect()
    }
}

impl NetworkDescriptor {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_AZS).contains(&self.max_azs) {
            return Err(SynthError::descriptor(
                "network",
                format!("max_azs must be between 1 and {MAX_AZS}"),
            ));
        }
        if self.nat_gateways == 0 || self.nat_gateways > self.max_azs {
            return Err(SynthError::descriptor(
                "network",
                format!(
                    "nat_gateways must be between 1 and max_azs={}",
                    self.max_azs
                ),
            ));
        }
        Ok(())
    }

    /// Splits the VPC block evenly: public subnets first, then private, in
    /// availability-zone order.
    pub fn subnet_plan(&self) -> Result<Vec<SubnetPlan>> {
        self.validate()?;
        let (base, mask) = parse_cidr(&self.cidr)?;

        let subnet_count = self.max_azs * 2;
        let extra_bits = subnet_count.next_power_of_two().trailing_zeros();
        let subnet_mask = mask + extra_bits;
        if subnet_mask > SMALLEST_SUBNET_MASK {
            return Err(SynthError::descriptor(
                "network",
                format!(
                    "{} cannot hold {subnet_count} subnets (would need /{subnet_mask})",
                    self.cidr
                ),
            ));
        }

        let block_size = 1u64 << (32 - subnet_mask);
        let mut plan = Vec::with_capacity(subnet_count as usize);
        for (offset, (kind, az_index)) in [SubnetKind::Public, SubnetKind::Private]
            .into_iter()
            .flat_map(|kind| (0..self.max_azs).map(move |az| (kind, az)))
            .enumerate()
        {
            let start = u64::from(base) + offset as u64 * block_size;
            let address = Ipv4Addr::from(start as u32);
            plan.push(SubnetPlan {
                kind,
                az_index,
                cidr: format!("{address}/{subnet_mask}"),
            });
        }
        Ok(plan)
    }
}

fn parse_cidr(cidr: &str) -> Result<(u32, u32)> {
    let invalid = || SynthError::descriptor("network", format!("'{cidr}' is not an IPv4 CIDR"));

    let (address, mask) = cidr.split_once('/').ok_or_else(invalid)?;
    let address: Ipv4Addr = address.parse().map_err(|_| invalid())?;
    let mask: u32 = mask.parse().map_err(|_| invalid())?;
    if !(16..=28).contains(&mask) {
        return Err(SynthError::descriptor(
            "network",
            format!("VPC mask /{mask} must be between /16 and /28"),
        ));
    }

    let base = u32::from(address);
    let host_bits = (1u32 << (32 - mask)) - 1;
    if base & host_bits != 0 {
        return Err(SynthError::descriptor(
            "network",
            format!("'{cidr}' has host bits set"),
        ));
    }
    Ok((base, mask))
}

fn name_tags(stack_id: &str, path: &[&str]) -> Vec<Value> {
    vec![json!({ "Key": "Name", "Value": format!("{stack_id}/{}", path.join("/")) })]
}

pub fn declare(stack: &mut Stack, id: &str, descriptor: &NetworkDescriptor) -> Result<NetworkHandle> {
    let plan = descriptor.subnet_plan()?;
    let stack_id = stack.id().to_string();

    let vpc = stack.add_resource(
        &[id],
        Resource::new(
            VPC_TYPE,
            json!({
                "CidrBlock": descriptor.cidr,
                "EnableDnsHostnames": true,
                "EnableDnsSupport": true,
                "InstanceTenancy": "default",
                "Tags": name_tags(&stack_id, &[id]),
            }),
        ),
    )?;
    let vpc_id = Expr::reference(&vpc);

    let igw = stack.add_resource(
        &[id, "IGW"],
        Resource::new(
            "AWS::EC2::InternetGateway",
            json!({ "Tags": name_tags(&stack_id, &[id]) }),
        ),
    )?;
    let attachment = stack.add_resource(
        &[id, "VPCGW"],
        Resource::new(
            "AWS::EC2::VPCGatewayAttachment",
            json!({ "VpcId": vpc_id, "InternetGatewayId": Expr::reference(&igw) }),
        ),
    )?;

    let mut public_subnet_ids = Vec::new();
    let mut private_subnet_ids = Vec::new();
    let mut nat_gateway_ids = Vec::new();

    for subnet in &plan {
        let name = format!("{}Subnet{}", subnet.kind.label(), subnet.az_index + 1);
        let is_public = subnet.kind == SubnetKind::Public;

        let mut tags = name_tags(&stack_id, &[id, name.as_str()]);
        tags.push(json!({ "Key": "aws-cdk:subnet-type", "Value": subnet.kind.label() }));
        tags.push(json!({ "Key": subnet.kind.elb_role_tag(), "Value": "1" }));

        let subnet_id = stack.add_resource(
            &[id, name.as_str(), "Subnet"],
            Resource::new(
                SUBNET_TYPE,
                json!({
                    "VpcId": vpc_id,
                    "AvailabilityZone": Expr::select(subnet.az_index, Expr::GetAzs(String::new())),
                    "CidrBlock": subnet.cidr,
                    "MapPublicIpOnLaunch": is_public,
                    "Tags": tags,
                }),
            ),
        )?;
        let route_table = stack.add_resource(
            &[id, name.as_str(), "RouteTable"],
            Resource::new(
                "AWS::EC2::RouteTable",
                json!({ "VpcId": vpc_id, "Tags": name_tags(&stack_id, &[id, name.as_str()]) }),
            ),
        )?;
        let association = stack.add_resource(
            &[id, name.as_str(), "RouteTableAssociation"],
            Resource::new(
                "AWS::EC2::SubnetRouteTableAssociation",
                json!({
                    "RouteTableId": Expr::reference(&route_table),
                    "SubnetId": Expr::reference(&subnet_id),
                }),
            ),
        )?;

        if is_public {
            let default_route = stack.add_resource(
                &[id, name.as_str(), "DefaultRoute"],
                Resource::new(
                    "AWS::EC2::Route",
                    json!({
                        "RouteTableId": Expr::reference(&route_table),
                        "DestinationCidrBlock": ANYWHERE,
                        "GatewayId": Expr::reference(&igw),
                    }),
                )
                .depends_on(&attachment),
            )?;

            if subnet.az_index < descriptor.nat_gateways {
                let eip = stack.add_resource(
                    &[id, name.as_str(), "EIP"],
                    Resource::new(
                        "AWS::EC2::EIP",
                        json!({ "Domain": "vpc", "Tags": name_tags(&stack_id, &[id, name.as_str()]) }),
                    ),
                )?;
                let nat = stack.add_resource(
                    &[id, name.as_str(), "NATGateway"],
                    Resource::new(
                        NAT_GATEWAY_TYPE,
                        json!({
                            "SubnetId": Expr::reference(&subnet_id),
                            "AllocationId": Expr::get_att(&eip, "AllocationId"),
                            "Tags": name_tags(&stack_id, &[id, name.as_str()]),
                        }),
                    )
                    .depends_on(&association)
                    .depends_on(&default_route),
                )?;
                nat_gateway_ids.push(nat);
            }
            public_subnet_ids.push(Expr::reference(&subnet_id));
        } else {
            let nat = &nat_gateway_ids[(subnet.az_index % descriptor.nat_gateways) as usize];
            stack.add_resource(
                &[id, name.as_str(), "DefaultRoute"],
                Resource::new(
                    "AWS::EC2::Route",
                    json!({
                        "RouteTableId": Expr::reference(&route_table),
                        "DestinationCidrBlock": ANYWHERE,
                        "NatGatewayId": Expr::reference(nat),
                    }),
                ),
            )?;
            private_subnet_ids.push(Expr::reference(&subnet_id));
        }
    }

    tracing::debug!(
        component = "network",
        vpc = %vpc,
        subnets = plan.len(),
        nat_gateways = nat_gateway_ids.len(),
        "declared vpc"
    );
    stack.record_network();

    Ok(NetworkHandle {
        vpc_id,
        public_subnet_ids,
        private_subnet_ids,
        nat_gateway_ids,
    })
}
