//! Master stack primitives.
//!
//! [`MasterStack`] is the seam between the session and the library that
//! actually puts frames on the wire. The session only ever talks to the
//! network through this trait; [`crate::drivers::simulation::SimulatedMaster`]
//! is the in-tree implementation used by the binary's `--simulate` mode and
//! by the tests.

use ecat_common::hal::types::NetworkState;
use std::time::Duration;

/// Process data location of one slave inside the mapped images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlaveMapping {
    /// Offset of the slave's inputs in the input image [bytes]
    pub input_offset: usize,
    /// Size of the slave's inputs [bytes]
    pub input_len: usize,
    /// Offset of the slave's outputs in the output image [bytes]
    pub output_offset: usize,
    /// Size of the slave's outputs [bytes]
    pub output_len: usize,
}

/// Result of mapping the process image of the first group.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessImageLayout {
    /// Total input image size (slave → master) [bytes]
    pub inputs_len: usize,
    /// Total output image size (master → slave) [bytes]
    pub outputs_len: usize,
    /// Per-slave placement, in discovery order
    pub slaves: Vec<SlaveMapping>,
    /// Working counter contribution of the output datagrams
    pub outputs_wkc: u32,
    /// Working counter contribution of the input datagrams
    pub inputs_wkc: u32,
}

impl ProcessImageLayout {
    /// Working counter a healthy exchange returns.
    ///
    /// Outputs are read-write on the slave side and count twice.
    pub const fn expected_wkc(&self) -> u32 {
        self.outputs_wkc * 2 + self.inputs_wkc
    }
}

/// Primitive operations of an EtherCAT master stack.
///
/// Implementations own the transport socket and the raw I/O map. All calls
/// happen from one thread at a time (the session serialises them behind a
/// mutex).
pub trait MasterStack: Send + 'static {
    /// Open the raw socket on `interface`.
    ///
    /// Returns the stack's return code on failure.
    fn open(&mut self, interface: &str) -> Result<(), i32>;

    /// Close the transport. Must tolerate being called when not open.
    fn close(&mut self);

    /// Enumerate slaves and move them to PRE-OP. Returns the slave count.
    fn discover(&mut self) -> usize;

    /// Map the process data of the first group.
    fn map_process_image(&mut self) -> ProcessImageLayout;

    /// Configure distributed clocks. Returns false if no slave supports DC.
    fn configure_dc(&mut self) -> bool;

    /// Wait up to `timeout` for every slave to reach `target`.
    ///
    /// Returns the lowest state read back.
    fn state_check(&mut self, target: NetworkState, timeout: Duration) -> NetworkState;

    /// Request `target` for every slave.
    fn request_state(&mut self, target: NetworkState);

    /// Lowest state currently reported by any slave.
    fn read_state(&mut self) -> NetworkState;

    /// Queue the output image for transmission.
    fn send_process_data(&mut self, outputs: &[u8]);

    /// Wait up to `timeout` for the frame to return.
    ///
    /// Copies the input image into `inputs` and returns the observed
    /// working counter, or `None` if nothing came back in time.
    fn receive_process_data(&mut self, inputs: &mut [u8], timeout: Duration) -> Option<u32>;

    /// State of one slave (0-based position).
    fn slave_state(&mut self, slave: usize) -> NetworkState;

    /// Try to bring one slave back to OPERATIONAL. Returns true on success.
    fn recover_slave(&mut self, slave: usize, timeout: Duration) -> bool;
}
