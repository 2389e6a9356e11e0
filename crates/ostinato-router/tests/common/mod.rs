//! A buffer-backed host for exercising the router without a live transport.

use ostinato_router::MidiHost;
use ostinato_router::{input_id, output_id};

pub struct TestHost {
    inputs: Vec<Vec<(u32, Vec<u8>)>>,
    outputs: Vec<Vec<(u32, Vec<u8>)>>,
    connections: Vec<u32>,
}

impl TestHost {
    pub fn new() -> Self {
        Self {
            inputs: vec![Vec::new(); input_id::COUNT],
            outputs: vec![Vec::new(); output_id::COUNT],
            connections: vec![0; output_id::COUNT],
        }
    }

    /// Queue an event on an input port. Events must be fed in time order,
    /// as a real host buffer would deliver them.
    pub fn feed(&mut self, input: usize, time: u32, bytes: &[u8]) {
        if let Some((last, _)) = self.inputs[input].last() {
            assert!(*last <= time, "host buffers deliver in time order");
        }
        self.inputs[input].push((time, bytes.to_vec()));
    }

    /// Mark an output as having one connection.
    pub fn connect(&mut self, output: usize) {
        self.connections[output] = 1;
    }

    pub fn written(&self, output: usize) -> &[(u32, Vec<u8>)] {
        &self.outputs[output]
    }

    /// Drop queued input events (written outputs are cleared by the router
    /// at the start of each period).
    pub fn clear_inputs(&mut self) {
        for queue in &mut self.inputs {
            queue.clear();
        }
    }
}

impl MidiHost for TestHost {
    fn input_event_count(&mut self, port: usize) -> u32 {
        self.inputs.get(port).map_or(0, |q| q.len() as u32)
    }

    fn input_event(&mut self, port: usize, index: u32, buf: &mut [u8]) -> Option<(u32, usize)> {
        let (time, bytes) = self.inputs.get(port)?.get(index as usize)?;
        if bytes.len() > buf.len() {
            return None;
        }
        buf[..bytes.len()].copy_from_slice(bytes);
        Some((*time, bytes.len()))
    }

    fn clear_output(&mut self, port: usize) {
        if let Some(q) = self.outputs.get_mut(port) {
            q.clear();
        }
    }

    fn write_event(&mut self, port: usize, time: u32, bytes: &[u8]) -> bool {
        match self.outputs.get_mut(port) {
            Some(q) => {
                q.push((time, bytes.to_vec()));
                true
            }
            None => false,
        }
    }

    fn connection_count(&self, port: usize) -> u32 {
        self.connections.get(port).copied().unwrap_or(0)
    }
}
