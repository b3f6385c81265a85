//! Memory-mapped peripheral bus.
//!
//! The last kilobyte of every [`MemoryImage`] is a register file shared by the
//! program and the simulation. Addresses are absolute so programs can use
//! them directly. The window has three parts:
//!
//! - **system area** (`IO_BASE..PERIPHERAL_BASE`): stdout/stdin buffers and
//!   the crash message. Program-owned, cleared on reload.
//! - **common area**: navigation, drive and radar registers present on every
//!   processor entity.
//! - **archetype tail** (from [`addr::TAIL`]): turret, extractor, transporter
//!   and facility registers share the same offsets because an entity has at
//!   most one of those peripherals.
//!
//! Bridges never touch raw offsets. They ask the memory image for
//! [`PeripheralRegs`] with the entity's [`PeripheralKind`] and match on the
//! variant, so an extractor bridge cannot read turret fields by construction.
//!
//! Register classes: *input* fields are written by the program and read (and
//! for flags, cleared) by a bridge; *output* fields are written by a bridge
//! every tick; *handshake* fields are written by both sides at different
//! times.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::Vec2;
use crate::memory::{MemoryImage, IO_BASE};

/// Start of the peripheral registers. Everything below is the system area.
pub const PERIPHERAL_BASE: u32 = IO_BASE + 0x1E0;

pub const STDOUT_CAPACITY: u32 = 256;
pub const STDIN_CAPACITY: u32 = 64;
pub const CRASH_MESSAGE_CAPACITY: u32 = 128;
pub const RADAR_SLOTS: usize = 8;
pub const RADAR_SLOT_SIZE: u32 = 12;
pub const TECH_HASH_SIZE: u32 = 32;

/// Absolute register addresses.
pub mod addr {
    use super::IO_BASE;

    // System area.
    /// Stdout ring buffer; the newest bytes are at the end.
    pub const STDOUT: u32 = IO_BASE;
    /// Bytes of stdout in use (u32).
    pub const STDOUT_LEN: u32 = IO_BASE + 0x100;
    /// Handshake (u8): program sets 1 to request a line, console clears it.
    pub const STDIN_REQUEST: u32 = IO_BASE + 0x104;
    /// Output (u32): length of the delivered line.
    pub const STDIN_LEN: u32 = IO_BASE + 0x108;
    pub const STDIN_DATA: u32 = IO_BASE + 0x10C;
    /// NUL-terminated message written by the engine on a trap.
    pub const CRASH_MESSAGE: u32 = IO_BASE + 0x150;

    // Common area.
    /// Output (f32).
    pub const NAV_X: u32 = IO_BASE + 0x1E0;
    /// Output (f32).
    pub const NAV_Y: u32 = IO_BASE + 0x1E4;
    /// Output (f32, degrees).
    pub const NAV_HEADING: u32 = IO_BASE + 0x1E8;
    /// Input (f32 setpoint in [-1, 1]).
    pub const DRIVE_THROTTLE: u32 = IO_BASE + 0x1EC;
    /// Input (f32 setpoint, degrees).
    pub const DRIVE_TARGET_HEADING: u32 = IO_BASE + 0x1F0;
    /// Handshake (u8): see [`super::radar`].
    pub const RADAR_REQUEST: u32 = IO_BASE + 0x1F4;
    /// Input (f32).
    pub const RADAR_RANGE: u32 = IO_BASE + 0x1F8;
    /// Output (u32).
    pub const RADAR_COUNT: u32 = IO_BASE + 0x1FC;
    /// Output: `RADAR_SLOTS` x {x: f32, y: f32, class: u32}.
    pub const RADAR_RESULTS: u32 = IO_BASE + 0x200;

    /// Start of the archetype-specific tail.
    pub const TAIL: u32 = IO_BASE + 0x280;

    /// Input (f32 setpoint, degrees relative to the chassis).
    pub const TURRET_TARGET_ANGLE: u32 = TAIL;
    /// Input flag (u8), cleared by the bridge.
    pub const TURRET_SHOOT: u32 = TAIL + 0x04;
    /// Output (f32).
    pub const TURRET_ANGLE: u32 = TAIL + 0x08;
    /// Output (u32 ticks until the turret can fire).
    pub const TURRET_COOLDOWN: u32 = TAIL + 0x0C;

    /// Input flag (u8), cleared by the bridge.
    pub const EXTRACTOR_REQUEST: u32 = TAIL;
    /// Output (u8): see [`super::extractor`].
    pub const EXTRACTOR_STATUS: u32 = TAIL + 0x04;
    /// Output (u32).
    pub const EXTRACTOR_STORED: u32 = TAIL + 0x08;
    /// Output (u32).
    pub const EXTRACTOR_CAPACITY: u32 = TAIL + 0x0C;

    /// Input (u8): see [`super::transporter`], cleared by the bridge.
    pub const TRANSPORTER_COMMAND: u32 = TAIL;
    /// Output (u8).
    pub const TRANSPORTER_STATUS: u32 = TAIL + 0x04;
    /// Output (u32 cargo units).
    pub const TRANSPORTER_AMOUNT: u32 = TAIL + 0x08;
    /// Output (u32 entity id of the last transfer partner).
    pub const TRANSPORTER_PARTNER: u32 = TAIL + 0x0C;

    /// Handshake (u8): program writes an op, bridge answers and clears it.
    pub const FACILITY_OP: u32 = TAIL;
    /// Output (u8): see [`super::facility`].
    pub const FACILITY_STATUS: u32 = TAIL + 0x04;
    /// Output (u32).
    pub const FACILITY_QUEUE_LEN: u32 = TAIL + 0x08;
    /// Handshake (32 bytes): input for enqueue, output for dequeue.
    pub const FACILITY_HASH: u32 = TAIL + 0x10;
}

/// Radar request codes.
pub mod radar {
    pub const IDLE: u8 = 0;
    pub const REQUESTED: u8 = 1;
    pub const READY: u8 = 2;

    pub const CLASS_ALLY: u32 = 1;
    pub const CLASS_ENEMY: u32 = 2;
    pub const CLASS_RESOURCE: u32 = 3;
}

/// Extractor status codes.
pub mod extractor {
    pub const IDLE: u8 = 0;
    pub const OK: u8 = 1;
    pub const NOTHING_IN_RANGE: u8 = 2;
    pub const FULL: u8 = 3;
}

/// Transporter commands and status codes.
pub mod transporter {
    pub const LOAD: u8 = 1;
    pub const UNLOAD: u8 = 2;

    pub const IDLE: u8 = 0;
    pub const OK: u8 = 1;
    pub const NO_PARTNER: u8 = 2;
    pub const NOTHING_TO_MOVE: u8 = 3;
}

/// Facility ops and status codes.
pub mod facility {
    pub const ENQUEUE: u8 = 1;
    pub const DEQUEUE: u8 = 2;

    pub const IDLE: u8 = 0;
    pub const OK: u8 = 1;
    pub const QUEUE_FULL: u8 = 2;
    pub const UNKNOWN_TECH: u8 = 3;
    pub const QUEUE_EMPTY: u8 = 4;
    pub const BAD_OP: u8 = 5;
}

/// Which archetype-specific peripheral an entity carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeripheralKind {
    #[default]
    None,
    Turret,
    Extractor,
    Transporter,
    Facility,
}

/// Identifier of a researchable technology.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TechHash(pub [u8; 32]);

impl TechHash {
    /// Hash of a technology name.
    pub fn of(name: &str) -> Self {
        TechHash(*blake3::hash(name.as_bytes()).as_bytes())
    }

    pub const ZERO: TechHash = TechHash([0u8; 32]);
}

impl fmt::Debug for TechHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TechHash({})", self)
    }
}

impl fmt::Display for TechHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..6] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// One radar contact as written into a result slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadarContact {
    pub position: Vec2,
    pub class: u32,
}

/// Raw access to the I/O window with absolute addresses.
///
/// Addresses come from [`addr`] and are always inside the window.
struct Window<'a> {
    bytes: &'a mut [u8],
}

impl Window<'_> {
    fn index(address: u32) -> usize {
        (address - IO_BASE) as usize
    }

    fn u8(&self, address: u32) -> u8 {
        self.bytes[Self::index(address)]
    }

    fn set_u8(&mut self, address: u32, value: u8) {
        self.bytes[Self::index(address)] = value;
    }

    fn u32(&self, address: u32) -> u32 {
        let i = Self::index(address);
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.bytes[i..i + 4]);
        u32::from_le_bytes(word)
    }

    fn set_u32(&mut self, address: u32, value: u32) {
        let i = Self::index(address);
        self.bytes[i..i + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn f32(&self, address: u32) -> f32 {
        f32::from_bits(self.u32(address))
    }

    fn set_f32(&mut self, address: u32, value: f32) {
        self.set_u32(address, value.to_bits());
    }

    fn bytes(&self, address: u32, len: u32) -> &[u8] {
        let i = Self::index(address);
        &self.bytes[i..i + len as usize]
    }

    fn set_bytes(&mut self, address: u32, data: &[u8]) {
        let i = Self::index(address);
        self.bytes[i..i + data.len()].copy_from_slice(data);
    }
}

/// System area accessors used by the console externals and the engine.
pub struct SystemRegs<'a>(Window<'a>);

impl SystemRegs<'_> {
    /// Appends to stdout. When the buffer is full the oldest bytes are
    /// shifted out so the newest output is always kept.
    pub fn append_stdout(&mut self, data: &[u8]) {
        let cap = STDOUT_CAPACITY as usize;
        let used = (self.0.u32(addr::STDOUT_LEN) as usize).min(cap);
        let start = Window::index(addr::STDOUT);
        let buffer = &mut self.0.bytes[start..start + cap];

        if data.len() >= cap {
            buffer.copy_from_slice(&data[data.len() - cap..]);
            self.0.set_u32(addr::STDOUT_LEN, cap as u32);
            return;
        }

        let overflow = (used + data.len()).saturating_sub(cap);
        if overflow > 0 {
            buffer.copy_within(overflow..used, 0);
        }
        let at = used - overflow;
        buffer[at..at + data.len()].copy_from_slice(data);
        self.0
            .set_u32(addr::STDOUT_LEN, (at + data.len()) as u32);
    }

    pub fn request_stdin(&mut self) {
        self.0.set_u8(addr::STDIN_REQUEST, 1);
    }

    pub fn stdin_requested(&self) -> bool {
        self.0.u8(addr::STDIN_REQUEST) != 0
    }

    /// Delivers a line (truncated to [`STDIN_CAPACITY`]) and clears the
    /// request flag.
    pub fn deliver_stdin(&mut self, line: &[u8]) {
        let len = line.len().min(STDIN_CAPACITY as usize);
        self.0.set_bytes(addr::STDIN_DATA, &line[..len]);
        self.0.set_u32(addr::STDIN_LEN, len as u32);
        self.0.set_u8(addr::STDIN_REQUEST, 0);
    }

    /// Takes the delivered stdin line, if any, leaving the buffer empty.
    pub fn take_stdin(&mut self) -> Option<Vec<u8>> {
        let len = (self.0.u32(addr::STDIN_LEN) as usize).min(STDIN_CAPACITY as usize);
        if len == 0 {
            return None;
        }
        let line = self.0.bytes(addr::STDIN_DATA, len as u32).to_vec();
        self.0.set_u32(addr::STDIN_LEN, 0);
        Some(line)
    }

    /// Writes a NUL-terminated crash message and returns its address.
    pub fn set_crash_message(&mut self, message: &str) -> u32 {
        let max = CRASH_MESSAGE_CAPACITY as usize - 1;
        let bytes = message.as_bytes();
        let len = bytes.len().min(max);
        self.0.set_bytes(addr::CRASH_MESSAGE, &bytes[..len]);
        self.0.set_u8(addr::CRASH_MESSAGE + len as u32, 0);
        addr::CRASH_MESSAGE
    }
}

/// Navigation, drive and radar registers.
pub struct CommonRegs<'a>(Window<'a>);

impl CommonRegs<'_> {
    pub fn set_position(&mut self, position: Vec2) {
        self.0.set_f32(addr::NAV_X, position.x);
        self.0.set_f32(addr::NAV_Y, position.y);
    }

    pub fn set_heading(&mut self, heading: f32) {
        self.0.set_f32(addr::NAV_HEADING, heading);
    }

    pub fn throttle(&self) -> f32 {
        self.0.f32(addr::DRIVE_THROTTLE)
    }

    pub fn target_heading(&self) -> f32 {
        self.0.f32(addr::DRIVE_TARGET_HEADING)
    }

    pub fn radar_requested(&self) -> bool {
        self.0.u8(addr::RADAR_REQUEST) == radar::REQUESTED
    }

    pub fn radar_range(&self) -> f32 {
        self.0.f32(addr::RADAR_RANGE)
    }

    /// Writes up to [`RADAR_SLOTS`] contacts and marks the response ready.
    pub fn answer_radar(&mut self, contacts: &[RadarContact]) {
        let count = contacts.len().min(RADAR_SLOTS);
        for (slot, contact) in contacts.iter().take(count).enumerate() {
            let base = addr::RADAR_RESULTS + slot as u32 * RADAR_SLOT_SIZE;
            self.0.set_f32(base, contact.position.x);
            self.0.set_f32(base + 4, contact.position.y);
            self.0.set_u32(base + 8, contact.class);
        }
        self.0.set_u32(addr::RADAR_COUNT, count as u32);
        self.0.set_u8(addr::RADAR_REQUEST, radar::READY);
    }
}

pub struct TurretRegs<'a>(Window<'a>);

impl TurretRegs<'_> {
    pub fn target_angle(&self) -> f32 {
        self.0.f32(addr::TURRET_TARGET_ANGLE)
    }

    /// Reads and clears the shoot flag.
    pub fn take_shoot_request(&mut self) -> bool {
        let requested = self.0.u8(addr::TURRET_SHOOT) != 0;
        self.0.set_u8(addr::TURRET_SHOOT, 0);
        requested
    }

    pub fn set_angle(&mut self, angle: f32) {
        self.0.set_f32(addr::TURRET_ANGLE, angle);
    }

    pub fn set_cooldown(&mut self, ticks: u32) {
        self.0.set_u32(addr::TURRET_COOLDOWN, ticks);
    }
}

pub struct ExtractorRegs<'a>(Window<'a>);

impl ExtractorRegs<'_> {
    /// Reads and clears the extraction request flag.
    pub fn take_request(&mut self) -> bool {
        let requested = self.0.u8(addr::EXTRACTOR_REQUEST) != 0;
        self.0.set_u8(addr::EXTRACTOR_REQUEST, 0);
        requested
    }

    pub fn set_status(&mut self, status: u8) {
        self.0.set_u8(addr::EXTRACTOR_STATUS, status);
    }

    pub fn set_storage(&mut self, stored: u32, capacity: u32) {
        self.0.set_u32(addr::EXTRACTOR_STORED, stored);
        self.0.set_u32(addr::EXTRACTOR_CAPACITY, capacity);
    }
}

pub struct TransporterRegs<'a>(Window<'a>);

impl TransporterRegs<'_> {
    /// Reads and clears the pending command (0 when none).
    pub fn take_command(&mut self) -> u8 {
        let command = self.0.u8(addr::TRANSPORTER_COMMAND);
        self.0.set_u8(addr::TRANSPORTER_COMMAND, 0);
        command
    }

    pub fn set_status(&mut self, status: u8) {
        self.0.set_u8(addr::TRANSPORTER_STATUS, status);
    }

    pub fn set_amount(&mut self, amount: u32) {
        self.0.set_u32(addr::TRANSPORTER_AMOUNT, amount);
    }

    pub fn set_partner(&mut self, entity: u32) {
        self.0.set_u32(addr::TRANSPORTER_PARTNER, entity);
    }
}

pub struct FacilityRegs<'a>(Window<'a>);

impl FacilityRegs<'_> {
    /// The pending op, 0 when idle.
    pub fn op(&self) -> u8 {
        self.0.u8(addr::FACILITY_OP)
    }

    pub fn hash(&self) -> TechHash {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(self.0.bytes(addr::FACILITY_HASH, TECH_HASH_SIZE));
        TechHash(hash)
    }

    pub fn set_hash(&mut self, hash: TechHash) {
        self.0.set_bytes(addr::FACILITY_HASH, &hash.0);
    }

    /// Answers the pending op: writes the status and clears the op.
    pub fn answer(&mut self, status: u8) {
        self.0.set_u8(addr::FACILITY_STATUS, status);
        self.0.set_u8(addr::FACILITY_OP, facility::IDLE);
    }

    pub fn set_queue_len(&mut self, len: u32) {
        self.0.set_u32(addr::FACILITY_QUEUE_LEN, len);
    }
}

/// The archetype tail interpreted for one peripheral kind.
pub enum PeripheralRegs<'a> {
    None,
    Turret(TurretRegs<'a>),
    Extractor(ExtractorRegs<'a>),
    Transporter(TransporterRegs<'a>),
    Facility(FacilityRegs<'a>),
}

impl MemoryImage {
    pub fn system_regs(&mut self) -> SystemRegs<'_> {
        SystemRegs(Window {
            bytes: self.io_window_mut(),
        })
    }

    pub fn common_regs(&mut self) -> CommonRegs<'_> {
        CommonRegs(Window {
            bytes: self.io_window_mut(),
        })
    }

    /// Typed view of the archetype tail for `kind`.
    pub fn peripheral_regs(&mut self, kind: PeripheralKind) -> PeripheralRegs<'_> {
        let window = Window {
            bytes: self.io_window_mut(),
        };
        match kind {
            PeripheralKind::None => PeripheralRegs::None,
            PeripheralKind::Turret => PeripheralRegs::Turret(TurretRegs(window)),
            PeripheralKind::Extractor => PeripheralRegs::Extractor(ExtractorRegs(window)),
            PeripheralKind::Transporter => PeripheralRegs::Transporter(TransporterRegs(window)),
            PeripheralKind::Facility => PeripheralRegs::Facility(FacilityRegs(window)),
        }
    }

    /// Current stdout contents, oldest byte first.
    pub fn stdout(&self) -> &[u8] {
        let window = self.io_window();
        let len_at = (addr::STDOUT_LEN - IO_BASE) as usize;
        let mut word = [0u8; 4];
        word.copy_from_slice(&window[len_at..len_at + 4]);
        let used = (u32::from_le_bytes(word)).min(STDOUT_CAPACITY) as usize;
        let start = (addr::STDOUT - IO_BASE) as usize;
        &window[start..start + used]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::IO_SIZE;

    #[test]
    fn regions_do_not_overlap() {
        assert!(addr::STDOUT_LEN >= addr::STDOUT + STDOUT_CAPACITY);
        assert!(addr::CRASH_MESSAGE >= addr::STDIN_DATA + STDIN_CAPACITY);
        assert!(PERIPHERAL_BASE >= addr::CRASH_MESSAGE + CRASH_MESSAGE_CAPACITY);
        assert!(addr::TAIL >= addr::RADAR_RESULTS + RADAR_SLOTS as u32 * RADAR_SLOT_SIZE);
        assert!(addr::FACILITY_HASH + TECH_HASH_SIZE <= IO_BASE + IO_SIZE);
    }

    #[test]
    fn tail_offsets_alias_across_kinds() {
        assert_eq!(addr::TURRET_TARGET_ANGLE, addr::EXTRACTOR_REQUEST);
        assert_eq!(addr::TURRET_SHOOT, addr::EXTRACTOR_STATUS);
        assert_eq!(addr::FACILITY_OP, addr::TRANSPORTER_COMMAND);
    }

    #[test]
    fn stdout_appends_then_shifts() {
        let mut mem = MemoryImage::new();
        mem.system_regs().append_stdout(b"hello ");
        mem.system_regs().append_stdout(b"world");
        assert_eq!(mem.stdout(), b"hello world");

        // Three bytes past capacity push "hel" out.
        let filler = vec![b'x'; STDOUT_CAPACITY as usize - 11 + 3];
        mem.system_regs().append_stdout(&filler);
        let out = mem.stdout();
        assert_eq!(out.len(), STDOUT_CAPACITY as usize);
        assert_eq!(&out[..8], b"lo world");
        assert_eq!(out[out.len() - 1], b'x');
    }

    #[test]
    fn oversized_stdout_keeps_newest_bytes() {
        let mut mem = MemoryImage::new();
        let mut data = vec![b'a'; 300];
        data[299] = b'z';
        mem.system_regs().append_stdout(&data);
        assert_eq!(mem.stdout().len(), STDOUT_CAPACITY as usize);
        assert_eq!(*mem.stdout().last().unwrap(), b'z');
    }

    #[test]
    fn turret_shoot_flag_is_cleared_on_read() {
        let mut mem = MemoryImage::new();
        mem.write_u8(addr::TURRET_SHOOT, 1).unwrap();
        let PeripheralRegs::Turret(mut regs) = mem.peripheral_regs(PeripheralKind::Turret) else {
            panic!("expected turret registers");
        };
        assert!(regs.take_shoot_request());
        assert!(!regs.take_shoot_request());
    }

    #[test]
    fn radar_answer_sets_ready() {
        let mut mem = MemoryImage::new();
        mem.write_u8(addr::RADAR_REQUEST, radar::REQUESTED).unwrap();
        assert!(mem.common_regs().radar_requested());
        mem.common_regs().answer_radar(&[RadarContact {
            position: Vec2::new(3.0, 4.0),
            class: radar::CLASS_ENEMY,
        }]);
        assert_eq!(mem.read_u8(addr::RADAR_REQUEST).unwrap(), radar::READY);
        assert_eq!(mem.read_u32(addr::RADAR_COUNT).unwrap(), 1);
        assert_eq!(mem.read_f32(addr::RADAR_RESULTS + 4).unwrap(), 4.0);
    }

    #[test]
    fn facility_hash_handshake() {
        let mut mem = MemoryImage::new();
        let tech = TechHash::of("armor-plating");
        mem.write(addr::FACILITY_HASH, &tech.0).unwrap();
        mem.write_u8(addr::FACILITY_OP, facility::ENQUEUE).unwrap();
        let PeripheralRegs::Facility(mut regs) = mem.peripheral_regs(PeripheralKind::Facility)
        else {
            panic!("expected facility registers");
        };
        assert_eq!(regs.op(), facility::ENQUEUE);
        assert_eq!(regs.hash(), tech);
        regs.answer(facility::OK);
        assert_eq!(mem.read_u8(addr::FACILITY_OP).unwrap(), facility::IDLE);
        assert_eq!(mem.read_u8(addr::FACILITY_STATUS).unwrap(), facility::OK);
    }

    #[test]
    fn crash_message_is_truncated_and_terminated() {
        let mut mem = MemoryImage::new();
        let long = "e".repeat(500);
        let at = mem.system_regs().set_crash_message(&long);
        let text = mem.read_c_string(at, CRASH_MESSAGE_CAPACITY).unwrap();
        assert_eq!(text.len(), CRASH_MESSAGE_CAPACITY as usize - 1);
    }

    #[test]
    fn stdin_delivery_round() {
        let mut mem = MemoryImage::new();
        mem.system_regs().request_stdin();
        assert!(mem.system_regs().stdin_requested());
        mem.system_regs().deliver_stdin(b"go");
        assert!(!mem.system_regs().stdin_requested());
        assert_eq!(mem.system_regs().take_stdin().as_deref(), Some(&b"go"[..]));
        assert_eq!(mem.system_regs().take_stdin(), None);
    }

    #[test]
    fn tech_hash_is_stable() {
        assert_eq!(TechHash::of("lasers"), TechHash::of("lasers"));
        assert_ne!(TechHash::of("lasers"), TechHash::of("shields"));
    }
}
