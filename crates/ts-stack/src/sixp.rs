//! 6top Protocol (RFC 8480): cell negotiation between neighbours.
//!
//! At most one transaction per peer.  Cells are committed only when the
//! exchange completes:
//!
//! | exchange | responder commits | initiator commits |
//! |---|---|---|
//! | two-step | its response is MAC-acked | the response arrives |
//! | three-step | the confirmation arrives | its confirmation is MAC-acked |
//!
//! An `ADD` or `RELOCATE` request with an empty candidate list asks the
//! responder to propose cells, which makes the exchange three-step.
//!
//! The responder's cell policy is the generic one: a candidate is accepted
//! if its slot is free in every slotframe and not reserved by another
//! transaction.  Scheduling functions only decide *when* to negotiate.

use std::collections::{BTreeMap, BTreeSet};

use ts_core::{Eui64, LogEvent};

use crate::slotframe::{Cell, CellOptions, LinkType};
use crate::tsch::MINIMAL_HANDLE;
use crate::{Ctx, Mote, Packet, PacketType, Payload, Timer};

pub const SIXP_VERSION: u8 = 0;
/// Slotframes to wait for the next message of a transaction.
pub const TIMEOUT_SLOTFRAMES: u64 = (1 << 7) - 1;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SixpCommand {
    Add,
    Delete,
    Relocate,
    Count,
    List,
    Signal,
    Clear,
}

impl SixpCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            SixpCommand::Add => "ADD",
            SixpCommand::Delete => "DELETE",
            SixpCommand::Relocate => "RELOCATE",
            SixpCommand::Count => "COUNT",
            SixpCommand::List => "LIST",
            SixpCommand::Signal => "SIGNAL",
            SixpCommand::Clear => "CLEAR",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReturnCode {
    Success,
    Eol,
    Err,
    Reset,
    ErrVersion,
    ErrSfid,
    ErrSeqnum,
    ErrCelllist,
    ErrBusy,
    ErrLocked,
}

impl ReturnCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReturnCode::Success => "RC_SUCCESS",
            ReturnCode::Eol => "RC_EOL",
            ReturnCode::Err => "RC_ERR",
            ReturnCode::Reset => "RC_RESET",
            ReturnCode::ErrVersion => "RC_ERR_VERSION",
            ReturnCode::ErrSfid => "RC_ERR_SFID",
            ReturnCode::ErrSeqnum => "RC_ERR_SEQNUM",
            ReturnCode::ErrCelllist => "RC_ERR_CELLLIST",
            ReturnCode::ErrBusy => "RC_ERR_BUSY",
            ReturnCode::ErrLocked => "RC_ERR_LOCKED",
        }
    }

    /// Return codes after which the request may simply be retried later.
    pub fn is_retryable(self) -> bool {
        matches!(self, ReturnCode::ErrBusy | ReturnCode::ErrLocked)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MessageType {
    Request,
    Response,
    Confirmation,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Request => "REQUEST",
            MessageType::Response => "RESPONSE",
            MessageType::Confirmation => "CONFIRMATION",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SixpCode {
    Command(SixpCommand),
    Rc(ReturnCode),
}

impl SixpCode {
    pub fn as_str(self) -> &'static str {
        match self {
            SixpCode::Command(c) => c.as_str(),
            SixpCode::Rc(rc) => rc.as_str(),
        }
    }
}

/// A cell as carried in a 6P cell list.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SixpCell {
    pub slot_offset:    u32,
    pub channel_offset: u8,
}

impl From<&Cell> for SixpCell {
    fn from(c: &Cell) -> Self {
        SixpCell { slot_offset: c.slot_offset, channel_offset: c.channel_offset }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SixpMessage {
    pub version:              u8,
    pub msg_type:             MessageType,
    pub code:                 SixpCode,
    pub sfid:                 u8,
    pub seqnum:               u8,
    /// Slotframe the cells belong to.
    pub handle:               u8,
    /// Options from the sender's point of view.
    pub cell_options:         CellOptions,
    pub num_cells:            u32,
    pub cell_list:            Vec<SixpCell>,
    pub relocation_cell_list: Vec<SixpCell>,
    /// LIST paging.
    pub offset:               u32,
    pub max_num_cells:        u32,
}

impl SixpMessage {
    fn new(msg_type: MessageType, code: SixpCode, sfid: u8, seqnum: u8) -> Self {
        SixpMessage {
            version: SIXP_VERSION,
            msg_type,
            code,
            sfid,
            seqnum,
            handle: MINIMAL_HANDLE,
            cell_options: CellOptions::empty(),
            num_cells: 0,
            cell_list: Vec::new(),
            relocation_cell_list: Vec::new(),
            offset: 0,
            max_num_cells: 0,
        }
    }

    pub fn return_code(&self) -> Option<ReturnCode> {
        match self.code {
            SixpCode::Rc(rc) => Some(rc),
            SixpCode::Command(_) => None,
        }
    }
}

/// What a scheduling function asks 6P to negotiate.
#[derive(Clone, Debug, PartialEq)]
pub struct SixpRequest {
    pub command:              SixpCommand,
    /// Options of the cells at the initiator.
    pub cell_options:         CellOptions,
    pub num_cells:            u32,
    /// Candidates (ADD), cells to delete (DELETE) or to move (RELOCATE).
    pub cell_list:            Vec<SixpCell>,
    /// RELOCATE: candidate destinations.
    pub relocation_cell_list: Vec<SixpCell>,
    pub handle:               u8,
}

impl SixpRequest {
    pub fn new(command: SixpCommand, cell_options: CellOptions) -> Self {
        SixpRequest {
            command,
            cell_options,
            num_cells: 0,
            cell_list: Vec::new(),
            relocation_cell_list: Vec::new(),
            handle: MINIMAL_HANDLE,
        }
    }
}

/// Result reported to the scheduling function when a transaction ends.
#[derive(Clone, Debug, PartialEq)]
pub enum SixpOutcome {
    /// Cells committed (added, deleted, relocated to) or reported.
    Success { cells: Vec<SixpCell>, num_cells: u32 },
    Failure(ReturnCode),
    Timeout,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TxnState {
    /// Initiator: request out, waiting for the response.
    WaitResponse,
    /// Initiator (three-step): confirmation out, waiting for its MAC ACK.
    WaitConfirmationAck,
    /// Responder (two-step): response out, waiting for its MAC ACK.
    WaitResponseAck,
    /// Responder (three-step): waiting for the confirmation.
    WaitConfirmation,
}

#[derive(Clone, Debug)]
pub struct Transaction {
    pub peer:         Eui64,
    pub role:         Role,
    pub command:      SixpCommand,
    pub seqnum:       u8,
    pub state:        TxnState,
    pub handle:       u8,
    /// Options at this mote.
    pub cell_options: CellOptions,
    pub num_cells:    u32,
    /// Cells to add/delete/relocate-from.
    pub cells:        Vec<SixpCell>,
    /// RELOCATE: cells to relocate to.
    pub new_cells:    Vec<SixpCell>,
    /// Cells reserved by this transaction until it ends.
    pub locked:       Vec<SixpCell>,
    pub three_step:   bool,
}

#[derive(Debug, Default)]
pub struct Sixp {
    transactions: BTreeMap<Eui64, Transaction>,
    seqnums:      BTreeMap<Eui64, u8>,
}

/// Next 6P sequence number; 0 is only used after a reset.
pub fn next_seqnum(seqnum: u8) -> u8 {
    if seqnum == u8::MAX { 1 } else { seqnum + 1 }
}

impl Sixp {
    pub fn seqnum(&self, peer: Eui64) -> u8 {
        self.seqnums.get(&peer).copied().unwrap_or(0)
    }

    pub fn set_seqnum(&mut self, peer: Eui64, seqnum: u8) {
        self.seqnums.insert(peer, seqnum);
    }

    fn bump_seqnum(&mut self, peer: Eui64) {
        let next = next_seqnum(self.seqnum(peer));
        self.seqnums.insert(peer, next);
    }

    pub fn transaction(&self, peer: Eui64) -> Option<&Transaction> {
        self.transactions.get(&peer)
    }

    pub fn is_busy_with(&self, peer: Eui64) -> bool {
        self.transactions.contains_key(&peer)
    }

    /// Cells reserved by transactions other than the one with `except`.
    fn locked_cells(&self, except: Eui64) -> BTreeSet<SixpCell> {
        self.transactions
            .values()
            .filter(|t| t.peer != except)
            .flat_map(|t| t.locked.iter().copied())
            .collect()
    }
}

impl Mote {
    fn sixp_packet(&self, ctx: &mut Ctx, peer: Eui64, msg: SixpMessage) -> Packet {
        Packet::mac_only(ctx.new_uid(), PacketType::SixP, self.eui64, peer, Payload::SixP(msg))
    }

    fn sixp_send(&mut self, ctx: &mut Ctx, peer: Eui64, msg: SixpMessage, priority: bool) -> bool {
        let mut packet = self.sixp_packet(ctx, peer, msg.clone());
        packet.mac.priority = priority;
        ctx.log(self.id, LogEvent::SixpTx {
            packet:   packet.info(),
            msg_type: msg.msg_type.as_str().to_string(),
            code:     msg.code.as_str().to_string(),
            seqnum:   msg.seqnum,
        });
        self.tsch_enqueue(ctx, packet)
    }

    fn sixp_arm_timeout(&self, ctx: &mut Ctx, peer: Eui64) {
        let slots = TIMEOUT_SLOTFRAMES * u64::from(ctx.settings.tsch_slotframe_length);
        ctx.schedule_in(self.id, Timer::SixpTimeout { peer }, slots);
    }

    fn sixp_end(&mut self, ctx: &mut Ctx, peer: Eui64) -> Option<Transaction> {
        ctx.cancel(self.id, Timer::SixpTimeout { peer });
        self.sixp.transactions.remove(&peer)
    }

    /// Start a transaction with `peer`.  Returns `false` if one is already
    /// ongoing with that peer or the request could not be queued.
    pub fn sixp_send_request(&mut self, ctx: &mut Ctx, peer: Eui64, request: SixpRequest) -> bool {
        if self.sixp.is_busy_with(peer) {
            return false;
        }
        let seqnum = self.sixp.seqnum(peer);
        let mut msg =
            SixpMessage::new(MessageType::Request, SixpCode::Command(request.command), self.sf_id(), seqnum);
        msg.handle = request.handle;
        msg.cell_options = request.cell_options;
        msg.num_cells = request.num_cells;
        msg.cell_list = request.cell_list.clone();
        msg.relocation_cell_list = request.relocation_cell_list.clone();
        if request.command == SixpCommand::List {
            msg.max_num_cells = request.num_cells;
        }

        let three_step = matches!(request.command, SixpCommand::Add) && request.cell_list.is_empty()
            || matches!(request.command, SixpCommand::Relocate) && request.relocation_cell_list.is_empty();

        if !self.sixp_send(ctx, peer, msg, false) {
            return false;
        }
        let locked = match request.command {
            SixpCommand::Add => request.cell_list.clone(),
            SixpCommand::Relocate => request.relocation_cell_list.clone(),
            _ => Vec::new(),
        };
        self.sixp.transactions.insert(peer, Transaction {
            peer,
            role: Role::Initiator,
            command: request.command,
            seqnum,
            state: TxnState::WaitResponse,
            handle: request.handle,
            cell_options: request.cell_options,
            num_cells: request.num_cells,
            cells: request.cell_list,
            locked,
            new_cells: request.relocation_cell_list,
            three_step,
        });
        self.sixp_arm_timeout(ctx, peer);
        true
    }

    /// MAC outcome of one of our 6P frames.
    pub(crate) fn sixp_on_tx_done(&mut self, ctx: &mut Ctx, packet: &Packet, acked: bool) {
        let Payload::SixP(msg) = &packet.payload else {
            return;
        };
        let peer = packet.mac.dst;
        let Some(txn) = self.sixp.transactions.get(&peer) else {
            return;
        };
        if txn.seqnum != msg.seqnum {
            return;
        }
        let (role, state) = (txn.role, txn.state);

        if !acked {
            // Retries exhausted: the peer will not hear from us.
            self.sixp_timeout(ctx, peer);
            return;
        }

        match (role, state, msg.msg_type) {
            (Role::Initiator, TxnState::WaitResponse, MessageType::Request)
            | (Role::Responder, TxnState::WaitConfirmation, MessageType::Response) => {
                self.sixp_arm_timeout(ctx, peer);
            }
            (Role::Responder, TxnState::WaitResponseAck, MessageType::Response) => {
                if let Some(txn) = self.sixp_end(ctx, peer) {
                    self.sixp_commit(ctx, &txn);
                    ctx.log(self.id, LogEvent::SixpComp {
                        peer,
                        cmd: txn.command.as_str().to_string(),
                        seqnum: txn.seqnum,
                    });
                    if txn.command == SixpCommand::Clear {
                        self.sixp.set_seqnum(peer, 0);
                    }
                }
            }
            (Role::Initiator, TxnState::WaitConfirmationAck, MessageType::Confirmation) => {
                if let Some(txn) = self.sixp_end(ctx, peer) {
                    self.sixp_commit(ctx, &txn);
                    ctx.log(self.id, LogEvent::SixpComp {
                        peer,
                        cmd: txn.command.as_str().to_string(),
                        seqnum: txn.seqnum,
                    });
                    let cells = committed_cells(&txn);
                    self.sf_on_sixp_result(ctx, peer, txn.command, SixpOutcome::Success {
                        num_cells: cells.len() as u32,
                        cells,
                    });
                }
            }
            _ => {}
        }
    }

    pub(crate) fn on_sixp_timeout(&mut self, ctx: &mut Ctx, peer: Eui64) {
        self.sixp_timeout(ctx, peer);
    }

    fn sixp_timeout(&mut self, ctx: &mut Ctx, peer: Eui64) {
        let Some(txn) = self.sixp_end(ctx, peer) else {
            return;
        };
        ctx.log(self.id, LogEvent::SixpTimeout {
            peer,
            cmd: txn.command.as_str().to_string(),
            seqnum: txn.seqnum,
        });
        if txn.role == Role::Initiator {
            self.sf_on_sixp_result(ctx, peer, txn.command, SixpOutcome::Timeout);
        }
    }

    /// A 6P frame arrived.
    pub(crate) fn sixp_recv(&mut self, ctx: &mut Ctx, packet: Packet) {
        let peer = packet.mac.src;
        let Payload::SixP(msg) = &packet.payload else {
            return;
        };
        ctx.log(self.id, LogEvent::SixpRx {
            packet:   packet.info(),
            msg_type: msg.msg_type.as_str().to_string(),
            code:     msg.code.as_str().to_string(),
            seqnum:   msg.seqnum,
        });
        match msg.msg_type {
            MessageType::Request => self.sixp_on_request(ctx, peer, msg),
            MessageType::Response => self.sixp_on_response(ctx, peer, msg),
            MessageType::Confirmation => self.sixp_on_confirmation(ctx, peer, msg),
        }
    }

    fn sixp_response(&self, request: &SixpMessage, rc: ReturnCode) -> SixpMessage {
        let mut resp = SixpMessage::new(MessageType::Response, SixpCode::Rc(rc), self.sf_id(), request.seqnum);
        resp.handle = request.handle;
        resp
    }

    /// Seqnum bookkeeping after a response carrying `rc`, identical at both
    /// ends: `RC_ERR_SEQNUM` resets, `RC_RESET` leaves it, anything else
    /// moves to the next value.
    fn sixp_advance_seqnum(&mut self, peer: Eui64, rc: ReturnCode) {
        match rc {
            ReturnCode::ErrSeqnum => self.sixp.set_seqnum(peer, 0),
            ReturnCode::Reset => {}
            _ => self.sixp.bump_seqnum(peer),
        }
    }

    fn sixp_error(&self, ctx: &mut Ctx, peer: Eui64, error: &str, seqnum: u8) {
        ctx.log(self.id, LogEvent::SixpError { peer, error: error.to_string(), seqnum });
    }

    fn sixp_on_request(&mut self, ctx: &mut Ctx, peer: Eui64, req: &SixpMessage) {
        let SixpCode::Command(command) = req.code else {
            return;
        };

        let reject = if req.version != SIXP_VERSION {
            Some(ReturnCode::ErrVersion)
        } else if req.sfid != self.sf_id() {
            Some(ReturnCode::ErrSfid)
        } else if self.sixp.is_busy_with(peer) {
            Some(ReturnCode::ErrBusy)
        } else if command != SixpCommand::Clear && req.seqnum != self.sixp.seqnum(peer) {
            Some(ReturnCode::ErrSeqnum)
        } else {
            None
        };
        if let Some(rc) = reject {
            self.sixp_error(ctx, peer, rc.as_str(), req.seqnum);
            self.sixp_advance_seqnum(peer, rc);
            let resp = self.sixp_response(req, rc);
            self.sixp_send(ctx, peer, resp, true);
            return;
        }

        let own_options = req.cell_options.reversed();
        let mut resp = self.sixp_response(req, ReturnCode::Success);
        let mut txn = Transaction {
            peer,
            role: Role::Responder,
            command,
            seqnum: req.seqnum,
            state: TxnState::WaitResponseAck,
            handle: req.handle,
            cell_options: own_options,
            num_cells: req.num_cells,
            cells: Vec::new(),
            new_cells: Vec::new(),
            locked: Vec::new(),
            three_step: false,
        };
        let mut keep_txn = true;

        match command {
            SixpCommand::Add => {
                if req.cell_list.is_empty() {
                    // Three-step: propose cells, the initiator picks.
                    let offered = self.sixp_propose_cells(ctx, peer, req.handle, req.num_cells);
                    txn.three_step = true;
                    txn.state = TxnState::WaitConfirmation;
                    txn.locked = offered.clone();
                    resp.cell_list = offered;
                } else {
                    match self.sixp_pick_free(peer, &req.cell_list, req.num_cells) {
                        Ok(chosen) => {
                            txn.cells = chosen.clone();
                            txn.locked = chosen.clone();
                            resp.cell_list = chosen;
                        }
                        Err(rc) => {
                            resp.code = SixpCode::Rc(rc);
                            keep_txn = false;
                        }
                    }
                }
            }
            SixpCommand::Delete => {
                let owned = self.sixp_owned_cells(peer, req.handle, own_options, &req.cell_list);
                if owned.len() < req.cell_list.len().min(req.num_cells as usize) {
                    resp.code = SixpCode::Rc(ReturnCode::ErrCelllist);
                    keep_txn = false;
                } else {
                    let chosen: Vec<SixpCell> = owned.into_iter().take(req.num_cells as usize).collect();
                    txn.cells = chosen.clone();
                    resp.cell_list = chosen;
                }
            }
            SixpCommand::Relocate => {
                let owned = self.sixp_owned_cells(peer, req.handle, own_options, &req.cell_list);
                if owned.len() != req.cell_list.len() {
                    resp.code = SixpCode::Rc(ReturnCode::ErrCelllist);
                    keep_txn = false;
                } else {
                    let want = owned.len() as u32;
                    match self.sixp_pick_free(peer, &req.relocation_cell_list, want) {
                        Ok(chosen) => {
                            txn.cells = owned.into_iter().take(chosen.len()).collect();
                            txn.new_cells = chosen.clone();
                            txn.locked = chosen.clone();
                            resp.cell_list = chosen;
                        }
                        Err(rc) => {
                            resp.code = SixpCode::Rc(rc);
                            keep_txn = false;
                        }
                    }
                }
            }
            SixpCommand::Count => {
                resp.num_cells = self.sixp_cells_with(peer, req.handle, own_options).len() as u32;
                keep_txn = false;
            }
            SixpCommand::List => {
                let all = self.sixp_cells_with(peer, req.handle, own_options);
                let start = (req.offset as usize).min(all.len());
                let max = if req.max_num_cells == 0 { all.len() } else { req.max_num_cells as usize };
                let end = (start + max).min(all.len());
                resp.cell_list = all[start..end].to_vec();
                if end == all.len() {
                    resp.code = SixpCode::Rc(ReturnCode::Eol);
                }
                keep_txn = false;
            }
            SixpCommand::Signal => {
                keep_txn = false;
            }
            SixpCommand::Clear => {}
        }

        // An accepted CLEAR resets the seqnum once its response is acked.
        let accepted = matches!(resp.code, SixpCode::Rc(ReturnCode::Success | ReturnCode::Eol));
        if !(accepted && command == SixpCommand::Clear) {
            if let Some(rc) = resp.return_code() {
                self.sixp_advance_seqnum(peer, rc);
            }
        }
        if !self.sixp_send(ctx, peer, resp, true) {
            return;
        }
        if keep_txn {
            self.sixp.transactions.insert(peer, txn);
            self.sixp_arm_timeout(ctx, peer);
        }
    }

    fn sixp_on_response(&mut self, ctx: &mut Ctx, peer: Eui64, resp: &SixpMessage) {
        let Some(rc) = resp.return_code() else {
            return;
        };
        let matches = self.sixp.transactions.get(&peer).is_some_and(|t| {
            t.role == Role::Initiator && t.state == TxnState::WaitResponse && t.seqnum == resp.seqnum
        });
        if !matches {
            self.sixp_error(ctx, peer, "unexpected response", resp.seqnum);
            return;
        }

        self.sixp_advance_seqnum(peer, rc);

        if !matches!(rc, ReturnCode::Success | ReturnCode::Eol) {
            if let Some(txn) = self.sixp_end(ctx, peer) {
                self.sf_on_sixp_result(ctx, peer, txn.command, SixpOutcome::Failure(rc));
            }
            return;
        }

        let Some(mut txn) = self.sixp.transactions.remove(&peer) else {
            return;
        };
        ctx.cancel(self.id, Timer::SixpTimeout { peer });

        if txn.three_step {
            // Pick the offered cells that are free here too.
            let wanted = if txn.command == SixpCommand::Relocate { txn.cells.len() as u32 } else { txn.num_cells };
            let picked = match self.sixp_pick_free(peer, &resp.cell_list, wanted) {
                Ok(chosen) if chosen.is_empty() && wanted > 0 => Err(ReturnCode::ErrCelllist),
                other => other,
            };
            let chosen = match picked {
                Ok(chosen) => chosen,
                Err(rc) => {
                    // Release the responder's reservation and report the failure.
                    self.sixp_error(ctx, peer, rc.as_str(), txn.seqnum);
                    let mut conf =
                        SixpMessage::new(MessageType::Confirmation, SixpCode::Rc(rc), self.sf_id(), txn.seqnum);
                    conf.handle = txn.handle;
                    self.sixp_send(ctx, peer, conf, true);
                    self.sf_on_sixp_result(ctx, peer, txn.command, SixpOutcome::Failure(rc));
                    return;
                }
            };
            if txn.command == SixpCommand::Relocate {
                txn.new_cells = chosen.clone();
            } else {
                txn.cells = chosen.clone();
            }
            txn.locked = chosen.clone();
            txn.state = TxnState::WaitConfirmationAck;
            let mut conf =
                SixpMessage::new(MessageType::Confirmation, SixpCode::Rc(ReturnCode::Success), self.sf_id(), txn.seqnum);
            conf.handle = txn.handle;
            conf.cell_list = chosen;
            let seqnum = txn.seqnum;
            self.sixp.transactions.insert(peer, txn);
            if self.sixp_send(ctx, peer, conf, true) {
                self.sixp_arm_timeout(ctx, peer);
            } else {
                self.sixp.transactions.remove(&peer);
                self.sixp_error(ctx, peer, "confirmation not queued", seqnum);
            }
            return;
        }

        match txn.command {
            SixpCommand::Add => txn.cells = resp.cell_list.clone(),
            SixpCommand::Delete => {
                txn.cells.retain(|c| resp.cell_list.contains(c));
            }
            SixpCommand::Relocate => {
                let moved = resp.cell_list.len();
                txn.cells.truncate(moved);
                txn.new_cells = resp.cell_list.clone();
            }
            _ => {}
        }
        self.sixp_commit(ctx, &txn);
        ctx.log(self.id, LogEvent::SixpComp {
            peer,
            cmd: txn.command.as_str().to_string(),
            seqnum: txn.seqnum,
        });
        if txn.command == SixpCommand::Clear {
            self.sixp.set_seqnum(peer, 0);
        }
        let outcome = match txn.command {
            SixpCommand::Count => SixpOutcome::Success { cells: Vec::new(), num_cells: resp.num_cells },
            SixpCommand::List => SixpOutcome::Success {
                num_cells: resp.cell_list.len() as u32,
                cells:     resp.cell_list.clone(),
            },
            _ => {
                let cells = committed_cells(&txn);
                SixpOutcome::Success { num_cells: cells.len() as u32, cells }
            }
        };
        self.sf_on_sixp_result(ctx, peer, txn.command, outcome);
    }

    fn sixp_on_confirmation(&mut self, ctx: &mut Ctx, peer: Eui64, conf: &SixpMessage) {
        let matches = self.sixp.transactions.get(&peer).is_some_and(|t| {
            t.role == Role::Responder && t.state == TxnState::WaitConfirmation && t.seqnum == conf.seqnum
        });
        if !matches {
            self.sixp_error(ctx, peer, "unexpected confirmation", conf.seqnum);
            return;
        }
        let Some(mut txn) = self.sixp_end(ctx, peer) else {
            return;
        };
        if conf.return_code() != Some(ReturnCode::Success) {
            // RC_RESET and errors release what was reserved.
            return;
        }
        let accepted: Vec<SixpCell> = conf.cell_list.iter().filter(|c| txn.locked.contains(c)).copied().collect();
        if txn.command == SixpCommand::Relocate {
            txn.new_cells = accepted;
        } else {
            txn.cells = accepted;
        }
        self.sixp_commit(ctx, &txn);
        ctx.log(self.id, LogEvent::SixpComp {
            peer,
            cmd: txn.command.as_str().to_string(),
            seqnum: txn.seqnum,
        });
    }

    // ── Cell bookkeeping ──────────────────────────────────────────────────

    fn sixp_cells_with(&self, peer: Eui64, handle: u8, options: CellOptions) -> Vec<SixpCell> {
        self.tsch
            .slotframe(handle)
            .map(|sf| {
                sf.cells_with(Some(peer))
                    .filter(|c| c.options == options)
                    .map(SixpCell::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Members of `list` that exist toward `peer` with `options`.
    fn sixp_owned_cells(&self, peer: Eui64, handle: u8, options: CellOptions, list: &[SixpCell]) -> Vec<SixpCell> {
        let have = self.sixp_cells_with(peer, handle, options);
        list.iter().filter(|c| have.contains(c)).copied().collect()
    }

    /// Up to `num` candidates free in every slotframe and not reserved by
    /// another transaction.  `RC_ERR_LOCKED` if none are free only because
    /// of reservations.
    fn sixp_pick_free(&self, peer: Eui64, candidates: &[SixpCell], num: u32) -> Result<Vec<SixpCell>, ReturnCode> {
        let locked = self.sixp.locked_cells(peer);
        let locked_slots: BTreeSet<u32> = locked.iter().map(|c| c.slot_offset).collect();
        let mut chosen: Vec<SixpCell> = Vec::new();
        let mut saw_locked = false;
        for c in candidates {
            if chosen.len() as u32 >= num {
                break;
            }
            if !self.tsch.is_slot_free(c.slot_offset) || chosen.iter().any(|x| x.slot_offset == c.slot_offset) {
                continue;
            }
            if locked_slots.contains(&c.slot_offset) {
                saw_locked = true;
                continue;
            }
            chosen.push(*c);
        }
        if chosen.is_empty() && saw_locked {
            return Err(ReturnCode::ErrLocked);
        }
        Ok(chosen)
    }

    /// Responder side of a three-step ADD: offer free cells.
    fn sixp_propose_cells(&self, ctx: &mut Ctx, peer: Eui64, handle: u8, num: u32) -> Vec<SixpCell> {
        let locked: BTreeSet<u32> = self.sixp.locked_cells(peer).iter().map(|c| c.slot_offset).collect();
        let length = self.tsch.slotframe(handle).map_or(ctx.settings.tsch_slotframe_length, |sf| sf.length);
        let mut free: Vec<u32> = (1..length)
            .filter(|s| self.tsch.is_slot_free(*s) && !locked.contains(s))
            .collect();
        let mut out = Vec::new();
        let channels = ctx.settings.tsch_hopping_sequence.len().max(1) as u8;
        while out.len() < num.max(1) as usize && !free.is_empty() {
            let i = ctx.rng.gen_range(0..free.len());
            let slot_offset = free.swap_remove(i);
            out.push(SixpCell { slot_offset, channel_offset: ctx.rng.gen_range(0..channels) });
        }
        out
    }

    /// Apply a completed transaction to the local schedule.
    fn sixp_commit(&mut self, ctx: &mut Ctx, txn: &Transaction) {
        let peer = txn.peer;
        let make = |c: &SixpCell| Cell::new(c.slot_offset, c.channel_offset, txn.cell_options, Some(peer), LinkType::Normal);
        match txn.command {
            SixpCommand::Add => {
                for c in &txn.cells {
                    if let Err(e) = self.tsch_add_cell(ctx, txn.handle, make(c)) {
                        tracing::debug!(mote = %self.id, error = %e, "negotiated cell not added");
                    }
                }
            }
            SixpCommand::Delete => {
                for c in &txn.cells {
                    self.tsch_delete_cell(ctx, txn.handle, &make(c));
                }
            }
            SixpCommand::Relocate => {
                for c in &txn.cells {
                    self.tsch_delete_cell(ctx, txn.handle, &make(c));
                }
                for c in &txn.new_cells {
                    if let Err(e) = self.tsch_add_cell(ctx, txn.handle, make(c)) {
                        tracing::debug!(mote = %self.id, error = %e, "relocated cell not added");
                    }
                }
            }
            SixpCommand::Clear => {
                let cells: Vec<Cell> = self
                    .tsch
                    .slotframe(txn.handle)
                    .map(|sf| sf.cells_with(Some(peer)).cloned().collect())
                    .unwrap_or_default();
                for c in &cells {
                    self.tsch_delete_cell(ctx, txn.handle, c);
                }
            }
            SixpCommand::Count | SixpCommand::List | SixpCommand::Signal => {}
        }
    }

    /// Forget every transaction and sequence number.
    pub(crate) fn sixp_reset(&mut self, ctx: &mut Ctx) {
        let peers: Vec<Eui64> = self.sixp.transactions.keys().copied().collect();
        for peer in peers {
            ctx.cancel(self.id, Timer::SixpTimeout { peer });
        }
        self.sixp = Sixp::default();
    }
}

fn committed_cells(txn: &Transaction) -> Vec<SixpCell> {
    match txn.command {
        SixpCommand::Relocate => txn.new_cells.clone(),
        _ => txn.cells.clone(),
    }
}
