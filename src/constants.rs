use uuid::Uuid;

/**
 * How long (milliseconds) a transport round trip (connect, read, write,
 * subscribe) may take before the operation is reported as timed out.
 */
pub const OP_DEADLINE: u64 = 5000;

/**
 * How often (milliseconds) to poll the adapters for newly discovered
 * peripherals during a scan.
 */
pub const SCAN_POLL_DELAY: u64 = 200;

// The wand's GATT profile. Three services; the characteristic UUIDs are
// reproduced verbatim from the device firmware.

/**
 * Device information service.
 */
pub const INFO_SERVICE: Uuid = Uuid::from_u128(0x64A70010_F691_4B93_A6F4_0968F5B648F8);
pub const ORGANIZATION_CHARACTERISTIC: Uuid = Uuid::from_u128(0x64A7000B_F691_4B93_A6F4_0968F5B648F8);
pub const SOFTWARE_CHARACTERISTIC: Uuid = Uuid::from_u128(0x64A70013_F691_4B93_A6F4_0968F5B648F8);
pub const HARDWARE_CHARACTERISTIC: Uuid = Uuid::from_u128(0x64A70001_F691_4B93_A6F4_0968F5B648F8);

/**
 * IO service: battery, button, and the actuators.
 */
pub const IO_SERVICE: Uuid = Uuid::from_u128(0x64A70012_F691_4B93_A6F4_0968F5B648F8);
pub const BATTERY_CHARACTERISTIC: Uuid = Uuid::from_u128(0x64A70007_F691_4B93_A6F4_0968F5B648F8);
pub const USER_BUTTON_CHARACTERISTIC: Uuid = Uuid::from_u128(0x64A7000D_F691_4B93_A6F4_0968F5B648F8);
pub const VIBRATOR_CHARACTERISTIC: Uuid = Uuid::from_u128(0x64A70008_F691_4B93_A6F4_0968F5B648F8);
pub const LED_CHARACTERISTIC: Uuid = Uuid::from_u128(0x64A70009_F691_4B93_A6F4_0968F5B648F8);
pub const KEEP_ALIVE_CHARACTERISTIC: Uuid = Uuid::from_u128(0x64A7000F_F691_4B93_A6F4_0968F5B648F8);

/**
 * Motion sensor service.
 */
pub const SENSOR_SERVICE: Uuid = Uuid::from_u128(0x64A70011_F691_4B93_A6F4_0968F5B648F8);
pub const TEMPERATURE_CHARACTERISTIC: Uuid = Uuid::from_u128(0x64A70014_F691_4B93_A6F4_0968F5B648F8);
pub const QUATERNIONS_CHARACTERISTIC: Uuid = Uuid::from_u128(0x64A70002_F691_4B93_A6F4_0968F5B648F8);
pub const QUATERNIONS_RESET_CHARACTERISTIC: Uuid = Uuid::from_u128(0x64A70004_F691_4B93_A6F4_0968F5B648F8);
// pub const RAW_CHARACTERISTIC: Uuid = Uuid::from_u128(0x64A7000A_F691_4B93_A6F4_0968F5B648F8);
// pub const MOTION_CHARACTERISTIC: Uuid = Uuid::from_u128(0x64A7000C_F691_4B93_A6F4_0968F5B648F8);
// pub const MAGN_CALIBRATE_CHARACTERISTIC: Uuid = Uuid::from_u128(0x64A70021_F691_4B93_A6F4_0968F5B648F8);
